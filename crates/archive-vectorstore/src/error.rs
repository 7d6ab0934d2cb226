pub use archive_core::error::{ArchiveError as VectorStoreError, Result};

pub(crate) fn from_qdrant(e: qdrant_client::QdrantError) -> archive_core::error::ArchiveError {
    archive_core::error::ArchiveError::ExternalUnavailable(e.to_string())
}
