//! HTTP client abstraction.
//!
//! The cache and the search index are both spoken to over plain HTTP. The
//! actual client is abstracted behind [`HttpClient`] so the source and sink
//! can be exercised without a network; [`UreqClient`] is the production
//! implementation.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use std::io::Read;
use std::time::Duration;

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the start of the body as text, for error messages.
    pub fn body_snippet(&self) -> String {
        const MAX: usize = 200;
        let text = String::from_utf8_lossy(&self.body);
        match text.char_indices().nth(MAX) {
            Some((end, _)) => format!("{}...", &text[..end]),
            None => text.into_owned(),
        }
    }
}

/// A body being read incrementally.
pub type ByteStream = Box<dyn Read + Send>;

/// HTTP client abstraction.
///
/// Non-2xx statuses are returned as responses, not errors; only failures to
/// complete the exchange are errors.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request with query parameters.
    fn get(&self, url: &str, query: &[(&str, &str)]) -> SyncResult<HttpResponse>;

    /// Sends a POST request.
    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> SyncResult<HttpResponse>;

    /// Opens a long-lived GET response and returns its body as a reader.
    fn open_stream(&self, url: &str) -> SyncResult<ByteStream>;
}

/// [`HttpClient`] backed by `ureq`.
#[derive(Clone)]
pub struct UreqClient {
    agent: ureq::Agent,
    stream_agent: ureq::Agent,
}

impl UreqClient {
    /// Creates a client with the given timeouts.
    ///
    /// `request_timeout` bounds ordinary exchanges; streams only get the
    /// connect timeout since they are expected to stay open.
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(request_timeout))
            .timeout_connect(Some(connect_timeout))
            .build()
            .into();

        let stream_agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(connect_timeout))
            .build()
            .into();

        Self {
            agent,
            stream_agent,
        }
    }

    /// Creates a client from the sync configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.request_timeout, config.connect_timeout)
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Largest response body read into memory. Thread feeds run well past ureq's 10 MiB default.
const MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

fn transport_error(err: ureq::Error) -> SyncError {
    match err {
        ureq::Error::BadUri(uri) => SyncError::transport_fatal(format!("bad uri: {uri}")),
        ureq::Error::BodyExceedsLimit(limit) => {
            SyncError::transport_fatal(format!("response body exceeds {limit} bytes"))
        }
        other => SyncError::transport_retryable(other.to_string()),
    }
}

fn into_response(response: ureq::http::Response<ureq::Body>) -> SyncResult<HttpResponse> {
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .with_config()
        .limit(MAX_BODY_BYTES)
        .read_to_vec()
        .map_err(transport_error)?;
    Ok(HttpResponse { status, body })
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> SyncResult<HttpResponse> {
        let mut request = self.agent.get(url);
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        let response = request.call().map_err(transport_error)?;
        into_response(response)
    }

    fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        let response = self
            .agent
            .post(url)
            .header("Content-Type", content_type)
            .send(&body[..])
            .map_err(transport_error)?;
        into_response(response)
    }

    fn open_stream(&self, url: &str) -> SyncResult<ByteStream> {
        let response = self
            .stream_agent
            .get(url)
            .call()
            .map_err(|e| SyncError::EventStream(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(SyncError::EventStream(format!(
                "{url} returned status {status}"
            )));
        }

        Ok(Box::new(response.into_body().into_reader()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(304, "").is_success());
        assert!(!HttpResponse::new(503, "").is_success());
    }

    #[test]
    fn snippet_is_truncated() {
        let response = HttpResponse::new(500, "x".repeat(500));
        let snippet = response.body_snippet();
        assert_eq!(snippet.len(), 203);
        assert!(snippet.ends_with("..."));

        assert_eq!(HttpResponse::new(500, "short").body_snippet(), "short");
    }

    #[test]
    fn client_builds_from_config() {
        let config = SyncConfig::default().with_request_timeout(Duration::from_secs(3));
        let _client = UreqClient::from_config(&config);
    }

    #[test]
    fn oversized_body_is_not_retried() {
        let err = transport_error(ureq::Error::BodyExceedsLimit(MAX_BODY_BYTES));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("exceeds"));

        assert!(!transport_error(ureq::Error::BadUri("::".into())).is_retryable());
    }

    #[test]
    fn unreachable_host_is_retryable() {
        let client = UreqClient::new(Duration::from_millis(500), Duration::from_millis(500));
        let err = client.get("http://127.0.0.1:9/", &[]).unwrap_err();
        assert!(err.is_retryable());
    }
}
