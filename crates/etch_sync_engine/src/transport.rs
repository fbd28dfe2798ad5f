//! Seams between the engine and the outside world.
//!
//! [`ThreadSource`] is the cache side and [`DocumentSink`] the index side.
//! The HTTP implementations live in `source` and `sink`; [`MockSource`] and
//! [`MemorySink`] are in-memory stand-ins for testing.

use crate::error::{SyncError, SyncResult};
use crate::http::ByteStream;
use etch_protocol::{IndexedPost, RawRecord};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;

/// Read side: the content cache.
pub trait ThreadSource: Send + Sync {
    /// Lists every known thread locator.
    fn list_threads(&self) -> SyncResult<Vec<String>>;

    /// Fetches the raw records of one thread.
    ///
    /// An `Err` means the fetch was given up on; the caller skips the thread.
    fn fetch_records(&self, locator: &str) -> SyncResult<Vec<RawRecord>>;

    /// Opens the change-event stream.
    fn open_events(&self) -> SyncResult<ByteStream>;
}

/// Write side: the search index.
pub trait DocumentSink: Send + Sync {
    /// Submits one thread's posts as a single bulk upsert.
    fn submit(&self, posts: &[IndexedPost]) -> SyncResult<SubmitSummary>;
}

/// Outcome of an accepted bulk submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitSummary {
    /// Actions sent.
    pub submitted: usize,
    /// Actions the index reported as failed.
    pub failed: usize,
}

/// A thread source backed by in-memory data.
#[derive(Debug, Default)]
pub struct MockSource {
    threads: Mutex<Option<Vec<String>>>,
    feeds: Mutex<HashMap<String, Vec<u8>>>,
    events: Mutex<Option<Vec<u8>>>,
    fetched: Mutex<Vec<String>>,
}

impl MockSource {
    /// Creates an empty source whose thread list is unavailable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the thread list.
    pub fn set_threads<I, S>(&self, threads: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.threads.lock() = Some(threads.into_iter().map(Into::into).collect());
    }

    /// Sets the record feed body of a thread. Threads without one fail to fetch.
    pub fn set_feed(&self, locator: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.feeds.lock().insert(locator.into(), body.into());
    }

    /// Sets the raw event stream contents.
    pub fn set_events(&self, events: impl Into<Vec<u8>>) {
        *self.events.lock() = Some(events.into());
    }

    /// Returns every locator passed to `fetch_records`, in call order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

impl ThreadSource for MockSource {
    fn list_threads(&self) -> SyncResult<Vec<String>> {
        self.threads
            .lock()
            .clone()
            .ok_or_else(|| SyncError::SourceUnavailable("no mock thread list set".into()))
    }

    fn fetch_records(&self, locator: &str) -> SyncResult<Vec<RawRecord>> {
        self.fetched.lock().push(locator.to_string());
        self.feeds
            .lock()
            .get(locator)
            .map(|body| RawRecord::split_feed(body))
            .ok_or_else(|| SyncError::SourceFetch {
                locator: locator.to_string(),
                attempts: 1,
                reason: "no mock feed set".into(),
            })
    }

    fn open_events(&self) -> SyncResult<ByteStream> {
        self.events
            .lock()
            .clone()
            .map(|bytes| Box::new(Cursor::new(bytes)) as ByteStream)
            .ok_or_else(|| SyncError::EventStream("no mock event stream set".into()))
    }
}

/// A document sink that keeps submitted batches in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<IndexedPost>>>,
    calls: Mutex<usize>,
    failing_calls: Mutex<HashSet<usize>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `call`-th submission (0-indexed) fail.
    pub fn fail_call(&self, call: usize) {
        self.failing_calls.lock().insert(call);
    }

    /// Returns the accepted batches.
    pub fn batches(&self) -> Vec<Vec<IndexedPost>> {
        self.batches.lock().clone()
    }

    /// Returns every accepted post, across batches.
    pub fn documents(&self) -> Vec<IndexedPost> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

impl DocumentSink for MemorySink {
    fn submit(&self, posts: &[IndexedPost]) -> SyncResult<SubmitSummary> {
        let call = {
            let mut calls = self.calls.lock();
            let call = *calls;
            *calls += 1;
            call
        };

        if self.failing_calls.lock().contains(&call) {
            return Err(SyncError::IndexSubmit(format!("mock failure on call {call}")));
        }

        self.batches.lock().push(posts.to_vec());
        Ok(SubmitSummary {
            submitted: posts.len(),
            failed: 0,
        })
    }
}
