//! Error types for ragstore operations.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using ragstore's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ragstore operations.
///
/// Everything except [`Error::BackendUnavailable`] is a caller bug or a
/// permanent condition and must not be retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported filter expression.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Embedding or query length does not match the collection dimensionality.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Argument outside its accepted range (e.g. `k == 0`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Collection does not exist.
    #[error("collection not found: {0}")]
    NotFound(String),

    /// Collection name is already taken.
    #[error("collection already exists: {0}")]
    AlreadyExists(String),

    /// The storage backend is unreachable or timed out.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[source] BackendError),

    /// The storage backend reported a failure.
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),

    /// A worker task running a blocking call panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if a caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_))
    }
}

/// Errors reported by a [`StorageBackend`](crate::backend::StorageBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("unreachable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The collection table does not exist in the backend.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The collection table already exists in the backend.
    #[error("table already exists: {0}")]
    TableExists(String),

    /// The backend rejected a query it was handed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// IO error during storage operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistent state failed an integrity check.
    #[error("corrupted: {0}")]
    Corrupted(String),

    /// Rows or log records could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(_) | BackendError::Timeout(_) => {
                Error::BackendUnavailable(err)
            }
            other => Error::Backend(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = Error::DimensionMismatch {
            expected: 384,
            got: 512,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, got 512");
    }

    #[test]
    fn test_backend_unavailable_is_retryable() {
        let err: Error = BackendError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(err, Error::BackendUnavailable(_)));
        assert!(err.is_retryable());

        let err: Error = BackendError::Unavailable("connection refused".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_backend_error_keeps_source() {
        let err: Error = BackendError::Corrupted("bad checksum".into()).into();
        assert!(!err.is_retryable());
        let source = err.source().expect("wrapped cause");
        assert_eq!(source.to_string(), "corrupted: bad checksum");
    }

    #[test]
    fn test_caller_errors_are_not_retryable() {
        assert!(!Error::InvalidFilter("x".into()).is_retryable());
        assert!(!Error::NotFound("docs".into()).is_retryable());
        assert!(!Error::AlreadyExists("docs".into()).is_retryable());
        assert!(!Error::InvalidArgument("k".into()).is_retryable());
    }
}
