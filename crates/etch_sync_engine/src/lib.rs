//! # Etch Sync Engine
//!
//! Keeps a search index in step with the etch content cache.
//!
//! This crate provides:
//! - `SourceClient`: thread listing and record fetch with bounded retry
//! - `IndexSink`: one bulk upsert per thread
//! - `SyncEngine`: full sync and the shared per-thread indexing operation
//! - `EventStreamDispatcher`: incremental sync driven by the cache's events
//! - HTTP client abstraction with a `ureq` implementation
//!
//! ## Architecture
//!
//! ```text
//! full sync:   list_threads ──► index_thread (per locator, in order)
//! delta sync:  /events ──► dispatcher ──► index_thread (per cacheUpdate)
//!
//! index_thread: fetch_records ──► parse_record ──► submit
//! ```
//!
//! ## Key Invariants
//!
//! - A failed thread never stops the flow it belongs to
//! - A malformed record never affects its siblings
//! - Re-indexing a thread overwrites the same document IDs
//! - One event is fully handled before the next is read

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod events;
mod http;
mod sink;
mod source;
mod transport;

pub use config::{RetryConfig, SyncConfig, DEFAULT_INDEX_ORIGIN, DEFAULT_SOURCE_ORIGIN};
pub use engine::{
    FullSyncReport, HttpSyncEngine, SyncEngine, SyncStats, ThreadIndexer, ThreadReport,
};
pub use error::{SyncError, SyncResult};
pub use events::{DispatchReport, EventStreamDispatcher};
pub use http::{ByteStream, HttpClient, HttpResponse, UreqClient};
pub use sink::IndexSink;
pub use source::SourceClient;
pub use transport::{DocumentSink, MemorySink, MockSource, SubmitSummary, ThreadSource};
