//! Error types for Waymark
//!
//! Central error type shared across layers. Component-specific errors
//! (StoreError, RewindError, ...) live next to their components in
//! waymark-core and convert into this type at the boundary.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Waymark error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not a git repository: {0}")]
    NotARepository(String),

    #[error("Checkpoint store error: {0}")]
    Store(String),

    #[error("Ref update conflict: {0}")]
    RefConflict(String),

    // ========================================================================
    // Session lifecycle
    // ========================================================================
    #[error("Session state error: {0}")]
    State(String),

    #[error("Strategy error: {0}")]
    Strategy(String),

    // ========================================================================
    // Rewind
    // ========================================================================
    #[error("Checkpoint is not restorable: {0}")]
    NotRestorable(String),

    #[error("Rewind left the working tree partially restored: {0}")]
    PartialRestore(String),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External error conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Other
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether re-running the whole operation can be expected to succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RefConflict(_))
    }

    /// Whether the error message is meant for the user rather than a log
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::NotRestorable(_)
                | Error::PartialRestore(_)
                | Error::NotARepository(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(Error::RefConflict("lock".into()).is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_user_facing() {
        assert!(Error::NotRestorable("logs only".into()).is_user_facing());
        assert!(!Error::Internal("oops".into()).is_user_facing());
    }
}
