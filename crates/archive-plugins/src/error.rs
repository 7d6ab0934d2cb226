use thiserror::Error;

/// Errors a channel plugin's lifecycle or webhook handling can surface.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The webhook payload didn't parse into anything the plugin understands.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The plugin's upstream service (WAHA, IMAP, a documents API, …) is down.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    /// The plugin's settings are missing or malformed (e.g. no API key set).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// An operation exceeded its allowed time budget.
    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl From<PluginError> for archive_core::error::ArchiveError {
    fn from(e: PluginError) -> Self {
        match e {
            PluginError::InvalidPayload(msg) => archive_core::error::ArchiveError::InvalidInput(msg),
            PluginError::Unavailable(msg) => archive_core::error::ArchiveError::ExternalUnavailable(msg),
            PluginError::ConfigError(msg) => archive_core::error::ArchiveError::InvalidInput(msg),
            PluginError::Timeout { ms } => {
                archive_core::error::ArchiveError::ExternalUnavailable(format!("timed out after {ms}ms"))
            }
        }
    }
}
