//! `archive-ingest` (C5) — the ingestion pipeline: PII redaction, chunking,
//! quality filtering, asset-graph derivation, dual-vector embedding, and
//! identity-extraction dispatch. Channel plugins hand a [`SourceItem`] to
//! [`pipeline::ingest`]; everything else is internal plumbing.

pub mod chunk;
pub mod error;
pub mod pii;
pub mod pipeline;
pub mod types;

pub use error::{IngestError, Result};
pub use pipeline::{IngestDeps, ingest};
pub use types::{IngestOutcome, MediaInfo, SourceItem};
