//! Configuration for the sync engine.

use etch_protocol::{IndexTarget, SourceEncoding};
use std::time::Duration;

/// Default origin of the etch cache.
pub const DEFAULT_SOURCE_ORIGIN: &str = "http://localhost:25252";

/// Default origin of the search index.
pub const DEFAULT_INDEX_ORIGIN: &str = "http://localhost:9200";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Origin of the etch cache.
    pub source_origin: String,
    /// Origin of the search index.
    pub index_origin: String,
    /// Index name and document kind for bulk actions.
    pub target: IndexTarget,
    /// Encoding of the cache's record feed.
    pub encoding: SourceEncoding,
    /// Retry policy for per-thread record fetches.
    pub retry: RetryConfig,
    /// Timeout for a whole request/response exchange. Not applied to the event stream.
    pub request_timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(source_origin: impl Into<String>, index_origin: impl Into<String>) -> Self {
        Self {
            source_origin: trim_origin(source_origin.into()),
            index_origin: trim_origin(index_origin.into()),
            target: IndexTarget::default(),
            encoding: SourceEncoding::default(),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the index target.
    pub fn with_target(mut self, target: IndexTarget) -> Self {
        self.target = target;
        self
    }

    /// Sets the source encoding.
    pub fn with_encoding(mut self, encoding: SourceEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_ORIGIN, DEFAULT_INDEX_ORIGIN)
    }
}

fn trim_origin(origin: String) -> String {
    origin.trim_end_matches('/').to_string()
}

/// Bounded retry policy for per-thread record fetches.
///
/// Every retry waits the same `delay`; a retry wait blocks only the flow that
/// is fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Wait before each retry.
    pub delay: Duration,
}

impl RetryConfig {
    /// Creates a policy of `max_attempts` attempts, `delay` apart.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Creates a policy with a single attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Returns the wait before `attempt` (0-indexed); the first attempt never waits.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.delay
        }
    }
}

impl Default for RetryConfig {
    /// Five attempts, half a second apart.
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("http://cache.local:25252/", "http://search.local:9200")
            .with_target(IndexTarget::new("boards", "post").without_doc_type())
            .with_encoding(SourceEncoding::Utf8)
            .with_request_timeout(Duration::from_secs(60));

        assert_eq!(config.source_origin, "http://cache.local:25252");
        assert_eq!(config.index_origin, "http://search.local:9200");
        assert_eq!(config.target.index, "boards");
        assert_eq!(config.target.doc_type, None);
        assert_eq!(config.encoding, SourceEncoding::Utf8);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn defaults_match_cache_behaviour() {
        let config = SyncConfig::default();
        assert_eq!(config.source_origin, DEFAULT_SOURCE_ORIGIN);
        assert_eq!(config.target, IndexTarget::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(config.retry.delay_for_attempt(4), Duration::from_millis(500));
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn first_attempt_never_waits() {
        let config = RetryConfig::new(3, Duration::from_millis(250));
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(250));
    }
}
