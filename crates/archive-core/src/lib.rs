pub mod config;
pub mod error;

pub use config::ArchiveConfig;
pub use error::{ArchiveError, Result};
