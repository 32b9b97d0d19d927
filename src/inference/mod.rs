pub mod openai;
pub mod sse;

pub use openai::{ChatMessage, CompletionParams, CompletionStream, OpenAiClient};
pub use sse::{SseDecoder, DONE_SENTINEL};
