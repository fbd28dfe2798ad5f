//! # Etch Protocol
//!
//! Wire formats shared by the etch search broker.
//!
//! This crate provides:
//! - `RawRecord` and `parse_record` for the cache's line-oriented post feed
//! - `ThreadLocator` and `DocumentId` for deterministic document identity
//! - `SyncEvent` for the cache's change-event stream
//! - Bulk upsert encoding and bulk response decoding for the search index
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - A malformed record never produces a `Post`
//! - `DocumentId` is a pure function of `(locator, ordinal)`
//! - Unrecognised events decode to `SyncEvent::Unknown`, never to an error

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod error;
mod event;
mod identity;
mod record;

pub use bulk::{
    encode_bulk, BulkItemFailure, BulkResponse, IndexTarget, IndexedPost, PostDocument,
    DEFAULT_DOC_TYPE, DEFAULT_INDEX,
};
pub use error::{ProtocolError, ProtocolResult};
pub use event::SyncEvent;
pub use identity::{DocumentId, ThreadLocator};
pub use record::{parse_record, Post, RawRecord, SourceEncoding, FIELD_COUNT, FIELD_DELIMITER};
