use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    config::AppConfig,
    inference::{CompletionParams, OpenAiClient},
};

pub mod handlers;
pub mod stream;

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub upstream: OpenAiClient,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let upstream = OpenAiClient::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            upstream,
        })
    }

    pub fn letter_params(&self) -> CompletionParams {
        CompletionParams {
            temperature: Some(self.config.temperature),
            max_tokens: self.config.max_tokens,
        }
    }
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/generate-letter", post(handlers::generate_letter))
        .route("/api/health", get(handlers::health))
}

/// Full application: API routes, open CORS for the browser form, state attached.
pub fn router(state: AppState) -> Router {
    api_router()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}
