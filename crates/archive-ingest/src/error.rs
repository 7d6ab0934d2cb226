pub use archive_core::error::{ArchiveError as IngestError, Result};
