//! Bulk submission to the search index.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, UreqClient};
use crate::transport::{DocumentSink, SubmitSummary};
use etch_protocol::{encode_bulk, BulkResponse, IndexTarget, IndexedPost};
use tracing::{debug, warn};

const BULK_CONTENT_TYPE: &str = "application/x-ndjson";

/// Logged item failures per submission; the rest are only counted.
const MAX_LOGGED_FAILURES: usize = 5;

/// Sends bulk upserts to `{origin}/_bulk`.
pub struct IndexSink<C: HttpClient> {
    origin: String,
    client: C,
    target: IndexTarget,
}

impl<C: HttpClient> IndexSink<C> {
    /// Creates a sink for the index at `origin`.
    pub fn new(origin: impl Into<String>, client: C, target: IndexTarget) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            client,
            target,
        }
    }
}

impl IndexSink<UreqClient> {
    /// Creates a `ureq`-backed sink from the sync configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.index_origin.clone(),
            UreqClient::from_config(config),
            config.target.clone(),
        )
    }
}

impl<C: HttpClient> DocumentSink for IndexSink<C> {
    /// An empty batch is accepted without contacting the index.
    fn submit(&self, posts: &[IndexedPost]) -> SyncResult<SubmitSummary> {
        if posts.is_empty() {
            debug!("empty batch, nothing to submit");
            return Ok(SubmitSummary::default());
        }

        let body = encode_bulk(&self.target, posts)?;
        let url = format!("{}/_bulk", self.origin);
        let response = self
            .client
            .post(&url, BULK_CONTENT_TYPE, body.into_bytes())
            .map_err(|e| SyncError::IndexSubmit(e.to_string()))?;

        if !response.is_success() {
            return Err(SyncError::IndexSubmit(format!(
                "{url} returned status {}: {}",
                response.status,
                response.body_snippet()
            )));
        }

        let failures = BulkResponse::decode(&response.body)
            .map_err(|e| SyncError::IndexSubmit(format!("unreadable bulk response: {e}")))?
            .failures();

        for failure in failures.iter().take(MAX_LOGGED_FAILURES) {
            warn!(
                id = failure.id.as_deref().unwrap_or("?"),
                status = failure.status,
                reason = %failure.reason,
                "bulk item rejected"
            );
        }

        Ok(SubmitSummary {
            submitted: posts.len(),
            failed: failures.len(),
        })
    }
}
