use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// A single message in a chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Request to an LLM provider's chat/completion endpoint. Used for query
/// condensation and answer synthesis (spec §4.8 steps 1 and 8).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Response from an LLM provider (non-streaming).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

/// Common interface for all chat-capable LLM providers (Anthropic, OpenAI,
/// and OpenAI-compatible endpoints).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Stream response events through a channel. Default falls back to a
    /// single non-streaming call, emitting one `TextDelta` then `Done`.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        let _ = tx
            .send(StreamEvent::TextDelta {
                text: resp.content,
            })
            .await;
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }
}

/// Request to an embedding provider. Ingestion (C5) batches chunks through
/// this; retrieval (C8) embeds the condensed query the same way.
#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub model: String,
    pub inputs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EmbedResponse {
    pub model: String,
    pub vectors: Vec<Vec<f32>>,
    pub tokens: u32,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    async fn embed(&self, req: &EmbedRequest) -> Result<EmbedResponse, ProviderError>;
}

/// A single (candidate index, relevance score) produced by a reranker.
#[derive(Debug, Clone, Serialize)]
pub struct RerankResult {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct RerankRequest {
    pub model: String,
    pub query: String,
    pub documents: Vec<String>,
    pub top_n: usize,
}

/// Cross-encoder reranking service used by C8 step 6 when ≥5 candidates are
/// retrieved and reranking is enabled in settings.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;
    async fn rerank(&self, req: &RerankRequest) -> Result<Vec<RerankResult>, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<&ProviderError> for archive_core::error::ArchiveError {
    fn from(e: &ProviderError) -> Self {
        match e {
            ProviderError::Http(_) | ProviderError::Unavailable(_) => {
                archive_core::error::ArchiveError::ExternalUnavailable(e.to_string())
            }
            ProviderError::RateLimited { retry_after_ms } => {
                archive_core::error::ArchiveError::RateLimited(e.to_string(), retry_after_ms / 1000)
            }
            ProviderError::Api { status, .. } if *status >= 500 => {
                archive_core::error::ArchiveError::ExternalUnavailable(e.to_string())
            }
            ProviderError::Api { .. } | ProviderError::Parse(_) => {
                archive_core::error::ArchiveError::InvalidInput(e.to_string())
            }
            ProviderError::Cancelled => archive_core::error::ArchiveError::Internal(e.to_string()),
        }
    }
}
