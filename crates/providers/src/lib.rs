//! Inference providers
//!
//! The chat core only talks to models through [`InferenceClient`]; the
//! Ollama HTTP client is the production implementation.

pub mod ndjson;
pub mod ollama;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use shared::agent_api::{InferenceRequest, StreamChunk};
use shared::ChatResult;
use tokio::sync::mpsc::UnboundedSender;

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Request the whole reply in one response
    async fn generate(&self, request: &InferenceRequest) -> ChatResult<String>;

    /// Stream the reply token by token.
    ///
    /// Contract: every token goes through `tx` as `StreamChunk::Text`; a
    /// successful stream ends with `StreamChunk::Done` and `Ok(())`. On failure
    /// a `StreamChunk::Error` is sent (when possible) and
    /// `Err(ChatError::InferenceUnavailable)` is returned. Malformed fragments
    /// are skipped, never surfaced.
    async fn generate_stream(
        &self,
        request: &InferenceRequest,
        tx: UnboundedSender<StreamChunk>,
    ) -> ChatResult<()>;
}
