//! Event stream dispatch.
//!
//! The cache pushes a long-lived chunked response of newline-terminated JSON
//! objects. Events are decoded frame by frame as they arrive and handled
//! strictly one at a time: the next event is not read until the thread named
//! by the current one has been re-indexed.

use crate::engine::ThreadIndexer;
use crate::error::{SyncError, SyncResult};
use etch_protocol::SyncEvent;
use serde_json::Value;
use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counts for one run of the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events decoded.
    pub events_received: u64,
    /// Update events whose thread was indexed.
    pub threads_indexed: u64,
    /// Update events whose thread failed to index.
    pub threads_failed: u64,
    /// Events logged and skipped, undecodable frames included.
    pub events_ignored: u64,
}

/// Feeds decoded events to a [`ThreadIndexer`].
pub struct EventStreamDispatcher<'a, I: ThreadIndexer + ?Sized> {
    indexer: &'a I,
    cancelled: Arc<AtomicBool>,
}

impl<'a, I: ThreadIndexer + ?Sized> EventStreamDispatcher<'a, I> {
    /// Creates a dispatcher that stops once `cancelled` is set.
    pub fn new(indexer: &'a I, cancelled: Arc<AtomicBool>) -> Self {
        Self { indexer, cancelled }
    }

    /// Consumes `stream` until it ends.
    ///
    /// Returns `Cancelled` if cancellation is observed between events, and
    /// `EventStream` if reading the stream fails. Undecodable frames are
    /// skipped.
    pub fn run<R: Read>(&self, stream: R) -> SyncResult<DispatchReport> {
        let mut reader = BufReader::new(stream);
        let mut frame = Vec::new();
        let mut report = DispatchReport::default();

        loop {
            frame.clear();
            let read = reader
                .read_until(b'\n', &mut frame)
                .map_err(|e| SyncError::EventStream(format!("read failed: {e}")))?;
            if read == 0 {
                break;
            }
            self.dispatch_frame(&frame, &mut report)?;
        }

        info!(
            received = report.events_received,
            indexed = report.threads_indexed,
            failed = report.threads_failed,
            ignored = report.events_ignored,
            "event stream ended"
        );
        Ok(report)
    }

    /// Dispatches every event in one frame.
    ///
    /// A frame may carry several concatenated objects. Once it stops being
    /// valid JSON the rest of it is logged and dropped.
    fn dispatch_frame(&self, frame: &[u8], report: &mut DispatchReport) -> SyncResult<()> {
        let values = serde_json::Deserializer::from_slice(frame).into_iter::<Value>();

        for value in values {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(SyncError::Cancelled);
            }

            match value {
                Ok(value) => {
                    report.events_received += 1;
                    self.dispatch(SyncEvent::from_value(value), report);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        frame = %String::from_utf8_lossy(frame).trim_end(),
                        "skipping undecodable event"
                    );
                    report.events_ignored += 1;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handles a single event, blocking until any indexing it triggers is done.
    pub fn dispatch(&self, event: SyncEvent, report: &mut DispatchReport) {
        debug!(kind = event.kind(), url = ?event.url(), "event received");

        match event {
            SyncEvent::CacheUpdate { url, since } => {
                debug!(url = %url, since = ?since, "cache update");
                match self.indexer.index_thread(&url) {
                    Ok(_) => report.threads_indexed += 1,
                    Err(_) => report.threads_failed += 1,
                }
            }
            SyncEvent::CacheDelete { url } => {
                warn!(url = %url, "ignoring cache delete, indexed posts are kept");
                report.events_ignored += 1;
            }
            SyncEvent::Unknown { raw } => {
                warn!(event = %raw, "ignoring unknown event");
                report.events_ignored += 1;
            }
        }
    }
}
