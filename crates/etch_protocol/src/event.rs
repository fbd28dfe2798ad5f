//! Change events pushed by the cache.
//!
//! Each event on the wire is a JSON object:
//!
//! ```json
//! {"event": "cacheUpdate", "url": "http://board.example/thread/42", "since": 17}
//! ```

use serde_json::Value;

const CACHE_UPDATE: &str = "cacheUpdate";
const CACHE_DELETE: &str = "cacheDelete";

/// A decoded change event.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A cached thread gained content.
    CacheUpdate {
        /// Thread locator.
        url: String,
        /// Opaque cursor of the first new record; not acted upon.
        since: Option<Value>,
    },
    /// A cached thread was removed.
    CacheDelete {
        /// Thread locator.
        url: String,
    },
    /// Anything else, kept verbatim for logging.
    Unknown {
        /// The payload as received.
        raw: Value,
    },
}

impl SyncEvent {
    /// Classifies an already parsed JSON value.
    ///
    /// Never fails: values that are not a recognised event object, including
    /// known kinds missing their `url`, become `Unknown`.
    pub fn from_value(value: Value) -> Self {
        let kind = value.get("event").and_then(Value::as_str);
        let url = value.get("url").and_then(Value::as_str);

        match (kind, url) {
            (Some(CACHE_UPDATE), Some(url)) => SyncEvent::CacheUpdate {
                url: url.to_string(),
                since: value.get("since").cloned(),
            },
            (Some(CACHE_DELETE), Some(url)) => SyncEvent::CacheDelete {
                url: url.to_string(),
            },
            _ => SyncEvent::Unknown { raw: value },
        }
    }

    /// Returns the event kind as it appears on the wire.
    pub fn kind(&self) -> &str {
        match self {
            SyncEvent::CacheUpdate { .. } => CACHE_UPDATE,
            SyncEvent::CacheDelete { .. } => CACHE_DELETE,
            SyncEvent::Unknown { raw } => raw
                .get("event")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }

    /// Returns the thread locator the event refers to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            SyncEvent::CacheUpdate { url, .. } | SyncEvent::CacheDelete { url } => Some(url),
            SyncEvent::Unknown { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_cache_update() {
        let value = serde_json::from_slice(
            br#"{"event":"cacheUpdate","url":"http://board.example/thread/42","since":17}"#,
        )
        .unwrap();
        let event = SyncEvent::from_value(value);

        assert_eq!(
            event,
            SyncEvent::CacheUpdate {
                url: "http://board.example/thread/42".into(),
                since: Some(json!(17)),
            }
        );
        assert_eq!(event.kind(), "cacheUpdate");
        assert_eq!(event.url(), Some("http://board.example/thread/42"));
    }

    #[test]
    fn since_is_optional() {
        let event = SyncEvent::from_value(json!({"event": "cacheUpdate", "url": "http://a/b"}));
        assert!(matches!(event, SyncEvent::CacheUpdate { since: None, .. }));
    }

    #[test]
    fn decodes_cache_delete() {
        let event = SyncEvent::from_value(json!({"event": "cacheDelete", "url": "http://a/b"}));
        assert_eq!(event, SyncEvent::CacheDelete { url: "http://a/b".into() });
    }

    #[test]
    fn unknown_kinds_are_kept() {
        let raw = json!({"event": "bogus", "url": "http://a/b"});
        let event = SyncEvent::from_value(raw.clone());
        assert_eq!(event, SyncEvent::Unknown { raw });
        assert_eq!(event.kind(), "bogus");
        assert_eq!(event.url(), None);
    }

    #[test]
    fn update_without_url_is_unknown() {
        let event = SyncEvent::from_value(json!({"event": "cacheUpdate", "since": 3}));
        assert!(matches!(event, SyncEvent::Unknown { .. }));
    }

    #[test]
    fn non_object_is_unknown() {
        let event = SyncEvent::from_value(json!([1, 2, 3]));
        assert_eq!(event.kind(), "unknown");
    }
}
