use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Success,
    Error,
}

/// Body of `GET /api/health`, also what the client-side probe reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiHealth {
    pub status: HealthStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ApiHealth {
    pub fn success(message: impl Into<String>, model: impl Into<String>, timestamp: String) -> Self {
        Self {
            status: HealthStatus::Success,
            message: message.into(),
            details: None,
            model: Some(model.into()),
            timestamp: Some(timestamp),
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: message.into(),
            details,
            model: None,
            timestamp: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == HealthStatus::Success
    }
}
