//! Retrieval engine (C8): turns a user question plus conversation history
//! into a grounded, cited answer over the personal archive. See `engine`
//! for the full New → Condense → Resolve → Classify → Expand → Retrieve →
//! Rerank → Synthesize → PostProcess → Done pipeline (spec §4.8).

pub mod condense;
pub mod engine;
pub mod entity_linking;
pub mod error;
pub mod expand;
pub mod intent;
pub mod prompt;
pub mod rich_content;

pub use engine::{
    answer_query, retrieve_only, QueryFilters, QueryRequest, QueryResponse, RetrievalDeps, SourceRef,
};
pub use error::EngineError;
pub use expand::ExpansionResult;
pub use intent::QueryIntent;
pub use rich_content::{ButtonOption, RichContentBlock, RichContentProcessor};
