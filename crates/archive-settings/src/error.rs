pub use archive_core::error::{ArchiveError as SettingsError, Result};
