//! etch broker
//!
//! Keeps a search index in step with the etch cache.
//!
//! # Flows
//!
//! - `--full` - re-index every thread the cache lists, once
//! - `--delta` - follow the cache's event stream and re-index updated threads
//!
//! With neither flag both flows run, each on its own thread.

mod flows;

use clap::Parser;
use etch_protocol::{IndexTarget, SourceEncoding, DEFAULT_DOC_TYPE, DEFAULT_INDEX};
use etch_sync_engine::{
    FullSyncReport, HttpSyncEngine, RetryConfig, SyncConfig, SyncError, SyncResult,
    DEFAULT_INDEX_ORIGIN, DEFAULT_SOURCE_ORIGIN,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Syncs posts from the etch cache into a search index.
#[derive(Parser, Debug)]
#[command(name = "etch-broker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Origin of the etch cache
    #[arg(long, default_value = DEFAULT_SOURCE_ORIGIN)]
    etch: String,

    /// Origin of the search index
    #[arg(long, default_value = DEFAULT_INDEX_ORIGIN)]
    es: String,

    /// Run a full sync of every thread
    #[arg(long)]
    full: bool,

    /// Follow the event stream
    #[arg(long)]
    delta: bool,

    /// Index name for bulk actions
    #[arg(long, default_value = DEFAULT_INDEX)]
    index: String,

    /// Document type for bulk actions
    #[arg(long, default_value = DEFAULT_DOC_TYPE)]
    doc_type: String,

    /// Leave the document type out of bulk actions
    #[arg(long)]
    omit_doc_type: bool,

    /// Encoding of the cache's record feed (shift_jis, utf-8)
    #[arg(long, default_value = "shift_jis")]
    source_encoding: SourceEncoding,

    /// Attempts per thread fetch
    #[arg(long, default_value_t = 5)]
    retry_attempts: u32,

    /// Wait between fetch attempts, in milliseconds
    #[arg(long, default_value_t = 500)]
    retry_delay_ms: u64,

    /// Timeout for ordinary requests, in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Reopen the event stream when it ends
    #[arg(long)]
    reconnect: bool,

    /// Wait before reopening the event stream, in seconds
    #[arg(long, default_value_t = 5)]
    reconnect_delay_secs: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Returns `(full, delta)`; selecting neither selects both.
    fn selected_flows(&self) -> (bool, bool) {
        if !self.full && !self.delta {
            (true, true)
        } else {
            (self.full, self.delta)
        }
    }

    fn sync_config(&self) -> SyncConfig {
        let mut target = IndexTarget::new(self.index.clone(), self.doc_type.clone());
        if self.omit_doc_type {
            target = target.without_doc_type();
        }

        SyncConfig::new(self.etch.clone(), self.es.clone())
            .with_target(target)
            .with_encoding(self.source_encoding)
            .with_retry(RetryConfig::new(
                self.retry_attempts,
                Duration::from_millis(self.retry_delay_ms),
            ))
            .with_request_timeout(Duration::from_secs(self.timeout_secs))
    }

    fn reconnect_delay(&self) -> Option<Duration> {
        self.reconnect
            .then(|| Duration::from_secs(self.reconnect_delay_secs))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.sync_config();
    let (full, delta) = cli.selected_flows();
    info!(
        etch = %config.source_origin,
        es = %config.index_origin,
        index = %config.target.index,
        encoding = %config.encoding,
        full,
        delta,
        "etch broker starting"
    );

    let engine = Arc::new(HttpSyncEngine::from_config(&config));

    let cancelled = engine.cancel_flag();
    ctrlc::set_handler(move || {
        info!("shutdown signal received, stopping");
        cancelled.store(true, Ordering::SeqCst);
    })?;

    let full_sync = if full {
        let engine = Arc::clone(&engine);
        Some(
            thread::Builder::new()
                .name("full-sync".into())
                .spawn(move || flows::run_full(&engine))?,
        )
    } else {
        None
    };

    let streaming = if delta {
        let engine = Arc::clone(&engine);
        let reconnect = cli.reconnect_delay();
        Some(
            thread::Builder::new()
                .name("event-stream".into())
                .spawn(move || flows::run_delta(&engine, reconnect))?,
        )
    } else {
        None
    };

    let full_outcome = match full_sync {
        Some(handle) => Some(handle.join().map_err(|_| "full sync thread panicked")?),
        None => None,
    };

    let stream_outcome = match streaming {
        Some(handle) => {
            // A blocked stream read cannot observe cancellation; stop waiting on it instead.
            while !handle.is_finished() && !engine.is_cancelled() {
                thread::sleep(Duration::from_millis(100));
            }
            if handle.is_finished() {
                Some(handle.join().map_err(|_| "event stream thread panicked")?)
            } else {
                None
            }
        }
        None => None,
    };

    let stats = engine.stats();
    info!(
        threads_indexed = stats.threads_indexed,
        threads_failed = stats.threads_failed,
        posts_submitted = stats.posts_submitted,
        records_malformed = stats.records_malformed,
        "etch broker stopped"
    );

    match exit_error(full_outcome, stream_outcome) {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Picks the error the process exits with. Cancellation is a clean exit, and
/// a full-sync failure wins over a stream failure.
fn exit_error(
    full: Option<SyncResult<FullSyncReport>>,
    stream: Option<SyncResult<()>>,
) -> Option<SyncError> {
    let full = full.and_then(Result::err);
    let stream = stream.and_then(Result::err);
    full.into_iter()
        .chain(stream)
        .find(|e| !matches!(e, SyncError::Cancelled))
}
