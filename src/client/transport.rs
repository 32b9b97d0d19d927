use std::future::Future;

use tracing::debug;

use super::ClientError;
use crate::{
    inference::{SseDecoder, DONE_SENTINEL},
    model::{ApiHealth, ErrorBody, LetterDelta, LetterRequest},
};

const GENERATE_FAILED: &str = "Failed to generate letter";
const HEALTH_CHECK_FAILED: &str = "Failed to check API status";

/// How the form reaches the letter endpoint.
pub trait LetterTransport: Send + Sync {
    /// Submits one request and resolves to the complete letter text.
    fn generate(
        &self,
        req: &LetterRequest,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;
}

/// HTTP client for a running SantaScribe server.
#[derive(Clone)]
pub struct LetterClient {
    http: reqwest::Client,
    base_url: String,
}

impl LetterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Streams a letter, calling `on_delta` with each piece as it arrives.
    pub async fn generate_with(
        &self,
        req: &LetterRequest,
        mut on_delta: impl FnMut(&str) + Send,
    ) -> Result<String, ClientError> {
        let mut response = self
            .http
            .post(format!("{}/api/generate-letter", self.base_url))
            .json(req)
            .send()
            .await
            .map_err(ClientError::network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.ok();
            return Err(ClientError::Api {
                status: status.as_u16(),
                error: body
                    .as_ref()
                    .map(|b| b.error.clone())
                    .unwrap_or_else(|| GENERATE_FAILED.to_string()),
                details: body.and_then(|b| b.details),
            });
        }

        let mut decoder = SseDecoder::new();
        let mut letter = String::new();

        while let Some(bytes) = response.chunk().await.map_err(ClientError::network)? {
            for payload in decoder.push(&bytes) {
                if payload == DONE_SENTINEL {
                    debug!(chars = letter.len(), "letter stream finished");
                    return if letter.trim().is_empty() {
                        Err(ClientError::EmptyLetter)
                    } else {
                        Ok(letter)
                    };
                }

                let delta: LetterDelta = serde_json::from_str(&payload)
                    .map_err(|e| ClientError::MalformedEvent(e.to_string()))?;
                on_delta(&delta.content);
                letter.push_str(&delta.content);
            }
        }

        Err(ClientError::IncompleteStream)
    }

    /// Probes `/api/health`. Never fails: problems come back as an error report.
    pub async fn check_health(&self) -> ApiHealth {
        let response = match self
            .http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return ApiHealth::error(HEALTH_CHECK_FAILED, Some(err.to_string())),
        };

        let ok = response.status().is_success();
        match response.json::<ApiHealth>().await {
            Ok(health) if ok && health.is_success() => health,
            Ok(health) => ApiHealth::error(health.message, health.details),
            Err(err) => ApiHealth::error(HEALTH_CHECK_FAILED, Some(err.to_string())),
        }
    }
}

impl LetterTransport for LetterClient {
    async fn generate(&self, req: &LetterRequest) -> Result<String, ClientError> {
        self.generate_with(req, |_| {}).await
    }
}
