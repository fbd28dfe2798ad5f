//! The two sync flows as the broker runs them.

use etch_sync_engine::{
    DocumentSink, FullSyncReport, SyncEngine, SyncError, SyncResult, ThreadSource,
};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Runs one full sync.
pub fn run_full<S: ThreadSource, K: DocumentSink>(
    engine: &SyncEngine<S, K>,
) -> SyncResult<FullSyncReport> {
    match engine.run_full_sync() {
        Ok(report) => Ok(report),
        Err(SyncError::Cancelled) => {
            info!("full sync cancelled");
            Err(SyncError::Cancelled)
        }
        Err(e) => {
            error!(error = %e, "full sync aborted");
            Err(e)
        }
    }
}

/// Follows the event stream.
///
/// Without `reconnect` the flow ends with the stream. With it, the stream is
/// reopened after `reconnect` has passed whenever it ends or fails with a
/// retryable error.
pub fn run_delta<S: ThreadSource, K: DocumentSink>(
    engine: &SyncEngine<S, K>,
    reconnect: Option<Duration>,
) -> SyncResult<()> {
    loop {
        match engine.stream_events() {
            Ok(report) => info!(
                received = report.events_received,
                indexed = report.threads_indexed,
                "event stream closed"
            ),
            Err(SyncError::Cancelled) => {
                info!("event stream cancelled");
                return Err(SyncError::Cancelled);
            }
            Err(e) if reconnect.is_some() && e.is_retryable() => {
                warn!(error = %e, "event stream failed")
            }
            Err(e) => {
                error!(error = %e, "event stream failed");
                return Err(e);
            }
        }

        let Some(delay) = reconnect else {
            return Ok(());
        };

        info!(delay_secs = delay.as_secs_f64(), "reopening event stream");
        sleep_unless_cancelled(engine, delay)?;
    }
}

fn sleep_unless_cancelled<S: ThreadSource, K: DocumentSink>(
    engine: &SyncEngine<S, K>,
    duration: Duration,
) -> SyncResult<()> {
    let deadline = Instant::now() + duration;
    loop {
        if engine.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}
