use std::collections::VecDeque;

use anyhow::Result;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sse::{SseDecoder, DONE_SENTINEL};
use crate::{config::AppConfig, error::UpstreamError};

/// Thin client for the OpenAI chat-completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionParams {
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl OpenAiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Waits for the whole completion and returns its text.
    pub async fn complete(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, UpstreamError> {
        let response = self.send(api_key, messages, params, false).await?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(UpstreamError::from_transport)?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    /// Opens a streamed completion. Errors reported before the first byte of
    /// the body (bad key, quota, rate limit, unreachable host) surface here.
    pub async fn stream(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<CompletionStream, UpstreamError> {
        let response = self.send(api_key, messages, params, true).await?;
        Ok(CompletionStream {
            response,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        })
    }

    async fn send(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        params: CompletionParams,
        stream: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream,
        };

        debug!(
            model = self.model.as_str(),
            stream,
            max_tokens = params.max_tokens,
            "sending chat completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(UpstreamError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_from_status(status, &text));
        }

        Ok(response)
    }
}

/// `"<status> <upstream message>"`, falling back to the raw body.
fn error_from_status(status: StatusCode, body: &str) -> UpstreamError {
    let detail = serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    if detail.is_empty() {
        UpstreamError::from_message(format!("{} status code (no body)", status.as_u16()))
    } else {
        UpstreamError::from_message(format!("{} {}", status.as_u16(), detail))
    }
}

const STREAM_ENDED_EARLY: &str = "network error: upstream stream ended before [DONE]";

/// An open streamed completion. Dropping it releases the upstream connection.
pub struct CompletionStream {
    response: reqwest::Response,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl CompletionStream {
    /// Next non-empty text delta, or `None` once the upstream sent `[DONE]`.
    /// A body that ends without the sentinel is an error.
    pub async fn next_delta(&mut self) -> Result<Option<String>, UpstreamError> {
        loop {
            while let Some(payload) = self.pending.pop_front() {
                if payload.trim() == DONE_SENTINEL {
                    self.finished = true;
                    self.pending.clear();
                    return Ok(None);
                }

                let chunk: ChatCompletionChunk = serde_json::from_str(&payload).map_err(|e| {
                    UpstreamError::from_message(format!("malformed stream chunk: {e}"))
                })?;

                if let Some(err) = chunk.error {
                    return Err(UpstreamError::from_message(err.message));
                }

                let delta: String = chunk
                    .choices
                    .into_iter()
                    .filter_map(|choice| choice.delta.content)
                    .collect();

                if !delta.is_empty() {
                    return Ok(Some(delta));
                }
            }

            if self.finished {
                return Ok(None);
            }

            match self
                .response
                .chunk()
                .await
                .map_err(UpstreamError::from_transport)?
            {
                Some(bytes) => self.pending.extend(self.decoder.push(&bytes)),
                // a completion only ends cleanly with `[DONE]`
                None => return Err(UpstreamError::from_message(STREAM_ENDED_EARLY)),
            }
        }
    }
}
