use thiserror::Error;

/// The six error kinds the system ever surfaces to a caller. Every crate's
/// own error enum converts into this one at its public boundary; nothing
/// downstream of a component ever sees a raw panic or a foreign error type.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("rate limited, retry after {retry_after_secs}s: {0}", retry_after_secs = .1)]
    RateLimited(String, u64),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ArchiveError {
    /// Short code surfaced in logs and in the JSON error body. Never a raw
    /// stack trace — see spec §7.
    pub fn code(&self) -> &'static str {
        match self {
            ArchiveError::InvalidInput(_) => "INVALID_INPUT",
            ArchiveError::NotFound(_) => "NOT_FOUND",
            ArchiveError::ExternalUnavailable(_) => "EXTERNAL_UNAVAILABLE",
            ArchiveError::RateLimited(..) => "RATE_LIMITED",
            ArchiveError::Conflict(_) => "CONFLICT",
            ArchiveError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP status this error maps to when surfaced over the gateway.
    pub fn status(&self) -> u16 {
        match self {
            ArchiveError::InvalidInput(_) => 400,
            ArchiveError::NotFound(_) => 404,
            ArchiveError::ExternalUnavailable(_) => 503,
            ArchiveError::RateLimited(..) => 429,
            ArchiveError::Conflict(_) => 409,
            ArchiveError::Internal(_) => 500,
        }
    }

    /// Whether the task runtime (C7) should retry an operation that failed
    /// with this error. `Conflict` is not retried — the identity store
    /// resolver already folded the conflict into the existing row.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ArchiveError::ExternalUnavailable(_) | ArchiveError::RateLimited(..)
        )
    }
}

impl From<rusqlite::Error> for ArchiveError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => ArchiveError::NotFound(e.to_string()),
            rusqlite::Error::SqliteFailure(ref se, _)
                if se.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ArchiveError::Conflict(e.to_string())
            }
            other => ArchiveError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(e: serde_json::Error) -> Self {
        ArchiveError::InvalidInput(e.to_string())
    }
}

impl From<reqwest::Error> for ArchiveError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            ArchiveError::ExternalUnavailable(e.to_string())
        } else if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                ArchiveError::RateLimited(e.to_string(), 30)
            } else if status.is_server_error() {
                ArchiveError::ExternalUnavailable(e.to_string())
            } else {
                ArchiveError::InvalidInput(e.to_string())
            }
        } else {
            ArchiveError::Internal(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
