use std::{fmt::Display, str::FromStr, time::Duration};

use anyhow::{anyhow, Result};
use tracing::{info, warn};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.9;
pub const DEFAULT_MAX_TOKENS: u32 = 400;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Process-wide settings, resolved once at startup and handed to the router.
#[derive(Clone)]
pub struct AppConfig {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub upstream_timeout: Duration,
    pub bind_addr: String,
}

impl AppConfig {
    /// Defaults for everything except the credential.
    pub fn new(openai_api_key: Option<String>) -> Self {
        Self {
            openai_api_key: openai_api_key.filter(|key| !key.trim().is_empty()),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::new(lookup("OPENAI_API_KEY"));
        if config.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; letter generation will be rejected");
        }

        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            config.openai_base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            config.model = model;
        }
        config.temperature = parse_or(&lookup, "LETTER_TEMPERATURE", config.temperature)?;
        config.max_tokens = parse_or(&lookup, "LETTER_MAX_TOKENS", config.max_tokens)?;
        config.upstream_timeout = Duration::from_secs(parse_or(
            &lookup,
            "UPSTREAM_TIMEOUT_SECS",
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?);
        if let Some(addr) = lookup("SANTASCRIBE_ADDR") {
            config.bind_addr = addr;
        }

        info!(
            model = config.model.as_str(),
            base_url = config.openai_base_url.as_str(),
            temperature = config.temperature,
            max_tokens = config.max_tokens,
            "configuration loaded"
        );

        Ok(config)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key.as_deref()
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key} value {raw:?}: {e}")),
        None => Ok(default),
    }
}
