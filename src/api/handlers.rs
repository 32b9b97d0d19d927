use axum::{body::Bytes, extract::State, response::Response, Json};
use chrono::{SecondsFormat, Utc};
use tracing::info;

use super::{stream::relay_response, AppState};
use crate::{
    error::{HealthError, LetterError, UpstreamError},
    inference::{ChatMessage, CompletionParams},
    model::{ApiHealth, LetterRequest},
    prompts,
};

/// Every OpenAI secret key starts with this.
pub const API_KEY_PREFIX: &str = "sk-";

const HEALTH_PROBE_MAX_TOKENS: u32 = 10;

pub async fn generate_letter(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, LetterError> {
    // parsed regardless of Content-Type
    let req: LetterRequest =
        serde_json::from_slice(&body).map_err(|err| LetterError::InvalidBody(err.to_string()))?;

    if !req.has_child_name() {
        return Err(LetterError::MissingChildName);
    }

    let api_key = state.config.api_key().ok_or(LetterError::MissingApiKey)?;

    let prompt = prompts::build_letter_prompt(&req, Utc::now().date_naive())?;
    let messages = [
        ChatMessage::system(prompts::system_prompt()),
        ChatMessage::user(prompt),
    ];

    info!(
        good_list = req.is_on_good_list,
        has_gifts = req.requested_gifts().is_some(),
        has_notes = !req.additional_notes.trim().is_empty(),
        "generating letter"
    );

    let upstream = state
        .upstream
        .stream(api_key, &messages, state.letter_params())
        .await?;

    Ok(relay_response(upstream))
}

pub async fn health(State(state): State<AppState>) -> Result<Json<ApiHealth>, HealthError> {
    let api_key = state.config.api_key().ok_or(HealthError::MissingApiKey)?;
    if !api_key.starts_with(API_KEY_PREFIX) {
        return Err(HealthError::MalformedApiKey);
    }

    let reply = state
        .upstream
        .complete(
            api_key,
            &[ChatMessage::user(prompts::HEALTH_PROBE_PROMPT)],
            CompletionParams {
                temperature: None,
                max_tokens: HEALTH_PROBE_MAX_TOKENS,
            },
        )
        .await?;

    if reply.trim().is_empty() {
        return Err(UpstreamError::from_message("No response from OpenAI").into());
    }

    info!(model = state.upstream.model(), "health check passed");

    Ok(Json(ApiHealth::success(
        "OpenAI API key is working correctly",
        state.upstream.model(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    )))
}
