//! Deterministic document identity.
//!
//! A post's index document ID is derived from its thread locator and its
//! ordinal: the locator's host and path segments joined by `-`, then `:` and
//! the ordinal. `http://board.example/thread/42` post 1 becomes
//! `board.example-thread-42:1`.

use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;
use url::Url;

/// Separator between host and path segments in a document ID.
const SEGMENT_SEPARATOR: char = '-';

/// Separator between the thread part and the ordinal.
const ORDINAL_SEPARATOR: char = ':';

/// A validated thread locator.
///
/// Parsing happens once per thread; IDs for its posts are then infallible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadLocator {
    raw: String,
    id_prefix: String,
}

impl ThreadLocator {
    /// Parses a locator as read from the cache.
    pub fn parse(locator: &str) -> ProtocolResult<Self> {
        let invalid = |reason: String| ProtocolError::InvalidLocator {
            locator: locator.to_string(),
            reason,
        };

        let url = Url::parse(locator).map_err(|e| invalid(e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("locator has no host".into()))?;

        let mut segments: Vec<&str> = url.path().split('/').skip(1).collect();
        while segments.last().is_some_and(|s| s.is_empty()) {
            segments.pop();
        }

        let mut id_prefix = host.to_string();
        for segment in segments {
            id_prefix.push(SEGMENT_SEPARATOR);
            id_prefix.push_str(segment);
        }

        Ok(Self {
            raw: locator.to_string(),
            id_prefix,
        })
    }

    /// Returns the locator exactly as it was given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the ID of the post at `ordinal` in this thread.
    pub fn document_id(&self, ordinal: u64) -> DocumentId {
        DocumentId(format!("{}{}{}", self.id_prefix, ORDINAL_SEPARATOR, ordinal))
    }
}

impl fmt::Display for ThreadLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Index document ID of a post; the idempotency key for upserts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    /// Derives the ID for post `ordinal` of the thread at `locator`.
    pub fn new(locator: &str, ordinal: u64) -> ProtocolResult<Self> {
        Ok(ThreadLocator::parse(locator)?.document_id(ordinal))
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
