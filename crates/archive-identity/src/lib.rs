//! `archive-identity` (C3) — the relational identity and asset graph:
//! persons with aliases/identifiers, time-invariant facts, relationships,
//! person↔asset links, asset↔asset edges, and the extraction dedup log.

pub mod cache;
pub mod db;
pub mod error;
pub mod extraction;
pub mod store;
pub mod types;

pub use extraction::{submit as submit_extraction, ExtractionRequest, ExtractionSource};
pub use store::IdentityStore;
pub use types::{
    AssetAssetEdge, AssetRole, ExtractionLogEntry, Fact, FactStatus, Person, PersonAssetLink,
    PersonIdentifiers, Relationship,
};
