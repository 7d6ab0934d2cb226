pub use archive_core::error::{ArchiveError as IdentityError, Result};
