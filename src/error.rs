use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::model::{letter::CHILD_NAME_REQUIRED, ApiHealth, ErrorBody};

pub const API_KEY_NOT_CONFIGURED: &str = "OpenAI API key is not configured";
const API_KEY_HINT: &str = "Please add OPENAI_API_KEY to your environment";

/// Failure classes of the upstream completion API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Auth,
    Quota,
    RateLimit,
    Connectivity,
    Unknown,
}

impl UpstreamErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            UpstreamErrorKind::Auth => StatusCode::UNAUTHORIZED,
            UpstreamErrorKind::Quota => StatusCode::PAYMENT_REQUIRED,
            UpstreamErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            UpstreamErrorKind::Connectivity => StatusCode::SERVICE_UNAVAILABLE,
            UpstreamErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Maps an upstream error message onto the taxonomy.
///
/// The upstream API has no stable machine-readable code for every failure, so
/// this is keyed on lowercase substrings of the message text. Order matters:
/// an auth failure that also mentions a quota is still an auth failure.
pub fn classify_upstream_message(message: &str) -> UpstreamErrorKind {
    let lower = message.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("incorrect api key") || has("invalid api key") {
        UpstreamErrorKind::Auth
    } else if has("quota") || has("insufficient_quota") {
        UpstreamErrorKind::Quota
    } else if has("rate limit") {
        UpstreamErrorKind::RateLimit
    } else if has("network") || has("econnrefused") || has("fetch failed") {
        UpstreamErrorKind::Connectivity
    } else {
        UpstreamErrorKind::Unknown
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_upstream_message(&message),
            message,
        }
    }

    /// Connect and timeout failures are reported as network errors so the
    /// classifier routes them to the connectivity class.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::from_message(format!("network error: {err}"))
        } else {
            Self::from_message(err.to_string())
        }
    }
}

/// Everything that can go wrong in `POST /api/generate-letter`.
#[derive(Debug, Error)]
pub enum LetterError {
    #[error("Invalid request body")]
    InvalidBody(String),

    #[error("Child's name is required")]
    MissingChildName,

    #[error("OpenAI API key is not configured")]
    MissingApiKey,

    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl LetterError {
    pub fn status(&self) -> StatusCode {
        match self {
            LetterError::InvalidBody(_) | LetterError::MissingChildName => StatusCode::BAD_REQUEST,
            LetterError::MissingApiKey | LetterError::Prompt(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            LetterError::Upstream(err) => err.kind.status(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            LetterError::InvalidBody(reason) => ("Invalid request body", Some(reason.clone())),
            LetterError::MissingChildName => (CHILD_NAME_REQUIRED, None),
            LetterError::MissingApiKey => (API_KEY_NOT_CONFIGURED, Some(API_KEY_HINT.to_string())),
            LetterError::Prompt(err) => ("Failed to generate letter", Some(err.to_string())),
            LetterError::Upstream(err) => match err.kind {
                UpstreamErrorKind::Auth => (
                    "Invalid API Key",
                    Some("Your OpenAI API key is invalid. Please check OPENAI_API_KEY.".to_string()),
                ),
                UpstreamErrorKind::Quota => (
                    "API Quota Exceeded",
                    Some(
                        "You've reached your OpenAI usage limit. Please check your billing at \
                         https://platform.openai.com/account/billing"
                            .to_string(),
                    ),
                ),
                UpstreamErrorKind::RateLimit => (
                    "Rate Limit Reached",
                    Some("Too many requests. Please wait a moment and try again.".to_string()),
                ),
                UpstreamErrorKind::Connectivity => (
                    "Connection Error",
                    Some(
                        "Cannot connect to OpenAI. Please check your internet connection."
                            .to_string(),
                    ),
                ),
                UpstreamErrorKind::Unknown => ("Failed to generate letter", Some(err.message.clone())),
            },
        };

        ErrorBody {
            error: error.to_string(),
            details,
        }
    }
}

impl IntoResponse for LetterError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            LetterError::Upstream(err) => {
                error!(
                    kind = ?err.kind,
                    status = status.as_u16(),
                    message = err.message.as_str(),
                    "letter generation failed upstream"
                )
            }
            LetterError::Prompt(err) => error!("letter prompt rendering failed: {err}"),
            other => warn!(status = status.as_u16(), "letter request rejected: {other}"),
        }

        (status, Json(self.body())).into_response()
    }
}

/// Everything that can go wrong in `GET /api/health`.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("OpenAI API key is not configured")]
    MissingApiKey,

    #[error("OpenAI API key format is invalid")]
    MalformedApiKey,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl HealthError {
    pub fn status(&self) -> StatusCode {
        match self {
            HealthError::MissingApiKey | HealthError::MalformedApiKey => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            HealthError::Upstream(err) => err.kind.status(),
        }
    }

    pub fn report(&self) -> ApiHealth {
        let (message, details) = match self {
            HealthError::MissingApiKey => (API_KEY_NOT_CONFIGURED, API_KEY_HINT.to_string()),
            HealthError::MalformedApiKey => (
                "OpenAI API key format is invalid",
                "API key should start with 'sk-'".to_string(),
            ),
            HealthError::Upstream(err) => match err.kind {
                UpstreamErrorKind::Auth => (
                    "OpenAI API key is invalid",
                    "Please check OPENAI_API_KEY and ensure it's correct".to_string(),
                ),
                UpstreamErrorKind::Quota => (
                    "OpenAI API quota exceeded",
                    "Please check your OpenAI account billing and usage limits".to_string(),
                ),
                UpstreamErrorKind::RateLimit => (
                    "OpenAI API rate limit reached",
                    "Please wait a moment and try again".to_string(),
                ),
                UpstreamErrorKind::Connectivity => (
                    "Cannot connect to OpenAI API",
                    "Please check your internet connection".to_string(),
                ),
                UpstreamErrorKind::Unknown => ("OpenAI API check failed", err.message.clone()),
            },
        };
        ApiHealth::error(message, Some(details))
    }
}

impl IntoResponse for HealthError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = status.as_u16(), "health check failed: {self}");
        (status, Json(self.report())).into_response()
    }
}
