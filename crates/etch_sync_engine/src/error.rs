//! Error types for the sync engine.

use etch_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The thread list could not be read from the cache.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A thread's records could not be fetched within the retry bound.
    #[error("fetching {locator} failed after {attempts} attempts: {reason}")]
    SourceFetch {
        /// Thread locator.
        locator: String,
        /// Attempts made.
        attempts: u32,
        /// Last failure seen.
        reason: String,
    },

    /// The index rejected or never received a bulk request.
    #[error("index submit failed: {0}")]
    IndexSubmit(String),

    /// The event stream could not be opened or read.
    #[error("event stream error: {0}")]
    EventStream(String),

    /// Record, locator or JSON error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::SourceFetch { .. } => true,
            SyncError::IndexSubmit(_) => true,
            SyncError::EventStream(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad uri").is_retryable());
        assert!(SyncError::EventStream("closed".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::SourceUnavailable("503".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::SourceFetch {
            locator: "http://board.example/thread/42".into(),
            attempts: 5,
            reason: "status 503".into(),
        };
        assert_eq!(
            err.to_string(),
            "fetching http://board.example/thread/42 failed after 5 attempts: status 503"
        );

        let err: SyncError = ProtocolError::InvalidLocator {
            locator: "x".into(),
            reason: "no host".into(),
        }
        .into();
        assert!(err.to_string().contains("invalid thread locator"));
    }
}
