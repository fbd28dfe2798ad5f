//! The sync engine.
//!
//! Both flows converge on [`SyncEngine::index_thread`]: fetch a thread's raw
//! records, parse them, and submit the surviving posts as one bulk upsert.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{DispatchReport, EventStreamDispatcher};
use crate::http::UreqClient;
use crate::sink::IndexSink;
use crate::source::SourceClient;
use crate::transport::{DocumentSink, ThreadSource};
use etch_protocol::{parse_record, IndexedPost, SourceEncoding, ThreadLocator};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Running totals across every flow using an engine.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Threads whose batch was accepted by the index.
    pub threads_indexed: u64,
    /// Threads skipped because a step failed.
    pub threads_failed: u64,
    /// Posts sent to the index.
    pub posts_submitted: u64,
    /// Bulk items the index rejected.
    pub items_failed: u64,
    /// Records dropped by the parser.
    pub records_malformed: u64,
    /// Completed full-sync runs.
    pub full_syncs_completed: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of indexing one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadReport {
    /// Thread locator.
    pub locator: String,
    /// Posts sent in the bulk request.
    pub posts_submitted: usize,
    /// Bulk items the index rejected.
    pub items_failed: usize,
    /// Records dropped as malformed.
    pub records_malformed: usize,
}

/// Result of a full sync.
#[derive(Debug, Clone, Default)]
pub struct FullSyncReport {
    /// Threads listed by the cache.
    pub threads_total: usize,
    /// Threads indexed.
    pub threads_indexed: usize,
    /// Threads skipped.
    pub threads_failed: usize,
    /// Posts sent to the index.
    pub posts_submitted: usize,
    /// Wall time of the run.
    pub duration: Duration,
}

/// Something that can index a single thread by locator.
pub trait ThreadIndexer: Send + Sync {
    /// Indexes the thread at `locator`.
    fn index_thread(&self, locator: &str) -> SyncResult<ThreadReport>;
}

/// Engine wired to the cache and index over HTTP.
pub type HttpSyncEngine = SyncEngine<SourceClient<UreqClient>, IndexSink<UreqClient>>;

/// The sync engine.
///
/// Holds no per-thread state between calls, so `index_thread` may run
/// concurrently for different locators.
pub struct SyncEngine<S: ThreadSource, K: DocumentSink> {
    source: S,
    sink: K,
    encoding: SourceEncoding,
    stats: RwLock<SyncStats>,
    cancelled: Arc<AtomicBool>,
}

impl HttpSyncEngine {
    /// Creates an engine talking to the cache and index named in `config`.
    pub fn from_config(config: &SyncConfig) -> Self {
        SyncEngine::new(
            SourceClient::from_config(config),
            IndexSink::from_config(config),
            config.encoding,
        )
    }
}

impl<S: ThreadSource, K: DocumentSink> SyncEngine<S, K> {
    /// Creates a new sync engine.
    pub fn new(source: S, sink: K, encoding: SourceEncoding) -> Self {
        Self {
            source,
            sink,
            encoding,
            stats: RwLock::new(SyncStats::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the thread source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the document sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Requests that running flows stop at their next checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns the shared cancellation flag, for signal handlers.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Fetches, parses and submits one thread.
    ///
    /// Failures are logged here and returned; they never affect other threads.
    pub fn index_thread(&self, locator: &str) -> SyncResult<ThreadReport> {
        info!(locator, "indexing thread");

        match self.try_index_thread(locator) {
            Ok(report) => {
                info!(
                    locator,
                    posts = report.posts_submitted,
                    malformed = report.records_malformed,
                    rejected = report.items_failed,
                    "thread indexed"
                );
                let mut stats = self.stats.write();
                stats.threads_indexed += 1;
                stats.posts_submitted += report.posts_submitted as u64;
                stats.items_failed += report.items_failed as u64;
                Ok(report)
            }
            Err(e) => {
                error!(locator, error = %e, "skipping thread");
                let mut stats = self.stats.write();
                stats.threads_failed += 1;
                stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn try_index_thread(&self, locator: &str) -> SyncResult<ThreadReport> {
        let thread = ThreadLocator::parse(locator)?;
        let records = self.source.fetch_records(locator)?;

        let mut posts = Vec::with_capacity(records.len());
        let mut malformed = 0;
        for record in &records {
            match parse_record(locator, record, self.encoding) {
                Ok(post) => posts.push(IndexedPost::new(thread.document_id(record.ordinal), post)),
                Err(e) => {
                    warn!(error = %e, "dropping record");
                    malformed += 1;
                }
            }
        }
        self.stats.write().records_malformed += malformed as u64;

        let summary = self.sink.submit(&posts)?;

        Ok(ThreadReport {
            locator: locator.to_string(),
            posts_submitted: summary.submitted,
            items_failed: summary.failed,
            records_malformed: malformed,
        })
    }

    /// Re-indexes every thread the cache knows, in listing order.
    ///
    /// Only a failure to list threads fails the run.
    pub fn run_full_sync(&self) -> SyncResult<FullSyncReport> {
        let start = Instant::now();

        info!("fetching all thread urls");
        let threads = self.source.list_threads()?;
        info!(threads = threads.len(), "starting full sync");

        let mut report = FullSyncReport {
            threads_total: threads.len(),
            ..FullSyncReport::default()
        };

        for locator in &threads {
            self.check_cancelled()?;

            match self.index_thread(locator) {
                Ok(thread) => {
                    report.threads_indexed += 1;
                    report.posts_submitted += thread.posts_submitted;
                }
                Err(_) => report.threads_failed += 1,
            }
        }

        report.duration = start.elapsed();
        self.stats.write().full_syncs_completed += 1;

        info!(
            indexed = report.threads_indexed,
            failed = report.threads_failed,
            posts = report.posts_submitted,
            elapsed_ms = report.duration.as_millis() as u64,
            "full sync finished"
        );
        Ok(report)
    }

    /// Opens the cache's event stream and dispatches it until it ends.
    pub fn stream_events(&self) -> SyncResult<DispatchReport> {
        let stream = self.source.open_events()?;
        info!("event stream opened");
        EventStreamDispatcher::new(self, self.cancel_flag()).run(stream)
    }
}

impl<S: ThreadSource, K: DocumentSink> ThreadIndexer for SyncEngine<S, K> {
    fn index_thread(&self, locator: &str) -> SyncResult<ThreadReport> {
        SyncEngine::index_thread(self, locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemorySink, MockSource};

    const THREAD: &str = "http://board.example/thread/42";

    fn engine() -> SyncEngine<MockSource, MemorySink> {
        SyncEngine::new(MockSource::new(), MemorySink::new(), SourceEncoding::ShiftJis)
    }

    #[test]
    fn engine_initial_state() {
        let engine = engine();
        assert_eq!(engine.stats().threads_indexed, 0);
        assert!(!engine.is_cancelled());
    }

    #[test]
    fn indexes_example_thread() {
        let engine = engine();
        engine.source().set_feed(
            THREAD,
            "Alice<>alice@example.com<>sage<>Hello <b>world</b><>My Title\n",
        );

        let report = engine.index_thread(THREAD).unwrap();
        assert_eq!(report.posts_submitted, 1);

        let documents = engine.sink().documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id.as_str(), "board.example-thread-42:1");
        assert_eq!(documents[0].post.name, "Alice");
        assert_eq!(documents[0].post.mail, "alice@example.com");
        assert_eq!(documents[0].post.meta, "sage");
        assert_eq!(documents[0].post.body, "Hello <b>world</b>");
        assert_eq!(documents[0].post.title, "My Title");
    }

    #[test]
    fn malformed_record_is_dropped_alone() {
        let engine = engine();
        engine
            .source()
            .set_feed(THREAD, "a<>b<>c<>d<>e\nbroken line\nf<>g<>h<>i<>j\n");

        let report = engine.index_thread(THREAD).unwrap();
        assert_eq!(report.posts_submitted, 2);
        assert_eq!(report.records_malformed, 1);

        let ids: Vec<String> = engine
            .sink()
            .documents()
            .iter()
            .map(|d| d.id.to_string())
            .collect();
        assert_eq!(
            ids,
            vec!["board.example-thread-42:1", "board.example-thread-42:3"]
        );
        assert_eq!(engine.stats().records_malformed, 1);
    }

    #[test]
    fn failed_fetch_skips_submission() {
        let engine = engine();

        let result = engine.index_thread(THREAD);
        assert!(matches!(result, Err(SyncError::SourceFetch { .. })));
        assert!(engine.sink().batches().is_empty());

        let stats = engine.stats();
        assert_eq!(stats.threads_failed, 1);
        assert!(stats.last_error.is_some());
    }

    #[test]
    fn invalid_locator_skips_fetch() {
        let engine = engine();

        let result = engine.index_thread("not a url");
        assert!(matches!(
            result,
            Err(SyncError::Protocol(etch_protocol::ProtocolError::InvalidLocator { .. }))
        ));
        assert!(engine.source().fetched().is_empty());
    }

    #[test]
    fn reindexing_is_idempotent() {
        let engine = engine();
        engine.source().set_feed(THREAD, "a<>b<>c<>d<>e\n");

        engine.index_thread(THREAD).unwrap();
        engine.index_thread(THREAD).unwrap();

        let batches = engine.sink().batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], batches[1]);
    }

    #[test]
    fn empty_feed_submits_empty_batch() {
        let engine = engine();
        engine.source().set_feed(THREAD, "");

        let report = engine.index_thread(THREAD).unwrap();
        assert_eq!(report.posts_submitted, 0);
        assert_eq!(engine.sink().batches(), vec![Vec::new()]);
    }

    #[test]
    fn full_sync_survives_submit_failure() {
        let engine = engine();
        engine
            .source()
            .set_threads(["http://a.example/t/1", "http://a.example/t/2"]);
        engine.source().set_feed("http://a.example/t/1", "a<>b<>c<>d<>e\n");
        engine.source().set_feed("http://a.example/t/2", "f<>g<>h<>i<>j\n");
        engine.sink().fail_call(0);

        let report = engine.run_full_sync().unwrap();
        assert_eq!(report.threads_total, 2);
        assert_eq!(report.threads_failed, 1);
        assert_eq!(report.threads_indexed, 1);

        let documents = engine.sink().documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id.as_str(), "a.example-t-2:1");
    }

    #[test]
    fn full_sync_keeps_listing_order() {
        let engine = engine();
        engine.source().set_threads([
            "http://a.example/t/3",
            "not a url",
            "http://a.example/t/1",
        ]);

        let report = engine.run_full_sync().unwrap();
        assert_eq!(report.threads_failed, 3);
        assert_eq!(
            engine.source().fetched(),
            vec!["http://a.example/t/3", "http://a.example/t/1"]
        );
        assert_eq!(engine.stats().full_syncs_completed, 1);
    }

    #[test]
    fn full_sync_needs_thread_list() {
        let engine = engine();
        assert!(matches!(
            engine.run_full_sync(),
            Err(SyncError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn cancelled_full_sync_stops() {
        let engine = engine();
        engine.source().set_threads(["http://a.example/t/1"]);
        engine.cancel();

        assert!(matches!(engine.run_full_sync(), Err(SyncError::Cancelled)));
        assert!(engine.source().fetched().is_empty());
    }

    #[test]
    fn concurrent_index_calls() {
        let engine = Arc::new(engine());
        for i in 0..4 {
            engine
                .source()
                .set_feed(format!("http://a.example/t/{i}"), "a<>b<>c<>d<>e\n");
        }

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.index_thread(&format!("http://a.example/t/{i}")))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(engine.stats().threads_indexed, 4);
        assert_eq!(engine.sink().documents().len(), 4);
    }
}
