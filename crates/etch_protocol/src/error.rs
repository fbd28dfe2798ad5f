//! Error types for the etch protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while decoding or encoding etch wire data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A raw record line could not be turned into a post.
    #[error("malformed record {ordinal} in {locator}: {cause}")]
    RecordParse {
        /// Thread the record belongs to.
        locator: String,
        /// 1-based position of the record in its thread.
        ordinal: u64,
        /// What was wrong with the line.
        cause: String,
    },

    /// A thread locator is not a usable URL.
    #[error("invalid thread locator {locator:?}: {reason}")]
    InvalidLocator {
        /// The offending locator.
        locator: String,
        /// Why it was rejected.
        reason: String,
    },

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::RecordParse {
            locator: "http://board.example/thread/42".into(),
            ordinal: 7,
            cause: "expected 5 fields, found 3".into(),
        };
        let text = err.to_string();
        assert!(text.contains("record 7"));
        assert!(text.contains("board.example"));
        assert!(text.contains("found 3"));

        let err = ProtocolError::InvalidLocator {
            locator: "nope".into(),
            reason: "relative URL without a base".into(),
        };
        assert!(err.to_string().contains("\"nope\""));
    }
}
