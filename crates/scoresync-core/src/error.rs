//! Error types for sync and cache operations

use thiserror::Error;

/// Main error type for all sync operations
///
/// Cloneable so that one settled result can be handed to every caller
/// waiting on the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The injected fetch function failed (network error, non-2xx, ...)
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Filesystem operation failed
    #[error("io error: {0}")]
    Io(String),

    /// Persistent backend is out of space
    #[error("storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Wrap any displayable error from a fetch collaborator
    pub fn fetch(err: impl std::fmt::Display) -> Self {
        SyncError::Fetch(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::Fetch("HTTP 503".to_string());
        assert_eq!(err.to_string(), "fetch failed: HTTP 503");

        let err = SyncError::QuotaExceeded {
            needed: 10,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "storage quota exceeded: 10 bytes needed, 2 available"
        );

        let err = SyncError::Deserialization("expected u32".to_string());
        assert_eq!(err.to_string(), "deserialization error: expected u32");
    }

    #[test]
    fn test_error_clone() {
        let err = SyncError::fetch("timed out");
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(SyncError::from(io), SyncError::Io(_)));
    }
}
