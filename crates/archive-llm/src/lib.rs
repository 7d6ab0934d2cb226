//! `archive-llm` — provider-agnostic chat, embedding, and reranking clients.
//!
//! Not one of the spec's numbered components itself; this is the load-bearing
//! plumbing that C2 (cost meter), C5 (ingestion embeddings), and C8
//! (retrieval condense/synthesis/rerank) all depend on. Every outbound call
//! passes through [`observer::Observed`] so the cost meter can intercept it
//! without any call site needing to know about billing.

pub mod anthropic;
pub mod health;
pub mod observer;
pub mod openai;
pub mod provider;
pub mod rerank;
pub mod router;
pub mod stream;

pub use observer::{CallEvent, CallKind, LlmCallObserver, Observed};
pub use provider::{
    ChatRequest, ChatResponse, EmbedRequest, EmbedResponse, Embedder, LlmProvider, Message,
    ProviderError, RerankRequest, RerankResult, Reranker, Role,
};
pub use router::ProviderRouter;
