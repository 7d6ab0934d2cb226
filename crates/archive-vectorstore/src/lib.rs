//! `archive-vectorstore` (C4) — the Qdrant-backed dual-vector (dense +
//! sparse) collection adapter: upsert, hybrid search with RRF fusion,
//! scroll, payload updates, deletes, and collection stats.

pub mod error;
pub mod payload;
pub mod rrf;
pub mod sparse;
pub mod store;

pub use payload::{generate_asset_id, ChunkPayload, ContentType, FilterValue, Predicate, SearchFilter};
pub use sparse::SparseVector;
pub use store::{CollectionStats, ScoredChunk, VectorStore};
