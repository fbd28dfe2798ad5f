//! HTTP client for the etch cache.
//!
//! Endpoints:
//! - `GET /` lists one thread locator per line
//! - `GET /cache?url=<locator>` serves a thread's record feed
//! - `GET /events` streams change events

use crate::config::{RetryConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::http::{ByteStream, HttpClient, UreqClient};
use crate::transport::ThreadSource;
use etch_protocol::RawRecord;
use std::thread;
use tracing::{debug, warn};

/// Reads thread lists, record feeds and events from the cache.
pub struct SourceClient<C: HttpClient> {
    origin: String,
    client: C,
    retry: RetryConfig,
}

impl<C: HttpClient> SourceClient<C> {
    /// Creates a source client for the cache at `origin`.
    pub fn new(origin: impl Into<String>, client: C, retry: RetryConfig) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            client,
            retry,
        }
    }

    fn fetch_once(&self, url: &str, locator: &str) -> SyncResult<Vec<u8>> {
        let response = self.client.get(url, &[("url", locator)])?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(SyncError::transport_retryable(format!(
                "status {}",
                response.status
            )))
        }
    }
}

impl SourceClient<UreqClient> {
    /// Creates a `ureq`-backed source client from the sync configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.source_origin.clone(),
            UreqClient::from_config(config),
            config.retry.clone(),
        )
    }
}

impl<C: HttpClient> ThreadSource for SourceClient<C> {
    fn list_threads(&self) -> SyncResult<Vec<String>> {
        let url = format!("{}/", self.origin);
        let response = self
            .client
            .get(&url, &[])
            .map_err(|e| SyncError::SourceUnavailable(e.to_string()))?;

        if !response.is_success() {
            return Err(SyncError::SourceUnavailable(format!(
                "{url} returned status {}: {}",
                response.status,
                response.body_snippet()
            )));
        }

        let body = String::from_utf8_lossy(&response.body);
        Ok(body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Fetches with the configured retry bound; the first success returns immediately.
    fn fetch_records(&self, locator: &str) -> SyncResult<Vec<RawRecord>> {
        let url = format!("{}/cache", self.origin);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < max_attempts {
            if attempts > 0 {
                thread::sleep(self.retry.delay_for_attempt(attempts));
            }
            attempts += 1;

            match self.fetch_once(&url, locator) {
                Ok(body) => {
                    debug!(locator, attempt = attempts, bytes = body.len(), "fetched records");
                    return Ok(RawRecord::split_feed(&body));
                }
                Err(e) => {
                    warn!(
                        locator,
                        attempt = attempts,
                        max_attempts,
                        error = %e,
                        "record fetch failed"
                    );
                    let retryable = e.is_retryable();
                    last_error = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(SyncError::SourceFetch {
            locator: locator.to_string(),
            attempts,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".into()),
        })
    }

    fn open_events(&self) -> SyncResult<ByteStream> {
        self.client.open_stream(&format!("{}/events", self.origin))
    }
}
