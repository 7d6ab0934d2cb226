use thiserror::Error;

/// Errors internal to the retrieval engine. Every public entry point
/// converts these into a user-visible string rather than propagating a
/// raw error to the HTTP layer (spec §7: "Anything on the retrieval path
/// surfaces synthesis failures as a user-visible... string").
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("embedding failed: {0}")]
    Embed(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("condense failed: {0}")]
    Condense(String),

    #[error("{0}")]
    Other(String),
}

impl From<archive_llm::ProviderError> for EngineError {
    fn from(e: archive_llm::ProviderError) -> Self {
        EngineError::Synthesis(e.to_string())
    }
}

impl From<archive_core::ArchiveError> for EngineError {
    fn from(e: archive_core::ArchiveError) -> Self {
        EngineError::Search(e.to_string())
    }
}

impl EngineError {
    /// Whether a single retry within the step is worth attempting (spec
    /// §4.8 state machine: "transient errors retry once within the step").
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Embed(_) | EngineError::Search(_) | EngineError::Synthesis(_) => true,
            EngineError::Condense(_) | EngineError::Other(_) => false,
        }
    }

    /// Short reason shown to the user (spec §7: "Sorry, I encountered an
    /// error: <short reason>" — never the full trace).
    pub fn short_reason(&self) -> String {
        match self {
            EngineError::Embed(_) => "the archive search is temporarily unavailable".to_string(),
            EngineError::Search(_) => "the archive search is temporarily unavailable".to_string(),
            EngineError::Synthesis(_) => "the answer service is temporarily unavailable".to_string(),
            EngineError::Condense(_) => "could not process the follow-up question".to_string(),
            EngineError::Other(m) => m.clone(),
        }
    }
}
