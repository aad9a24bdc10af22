//! Core data formats for tempora, a persistent versioned key-value store.
//!
//! This crate contains the pure, I/O-free pieces of the store:
//!
//! - [`record`]: the `VersionedRecord` returned by queries
//! - [`latest`]: the codec for the latest-value tier (one current version
//!   per key)
//! - [`segment_value`]: the codec packing all historical versions of one
//!   key within a time segment into a single stored value
//! - [`error`]: the shared error type
//!
//! The storage layer (engine seam, segment registry, put/get algorithms,
//! store facade) lives in the `tempora-storage` crate.

pub mod error;
pub mod latest;
pub mod record;
pub mod segment_value;

pub use error::{Error, Result};
pub use record::{Timestamp, VersionedRecord, NO_TIMESTAMP};
pub use segment_value::{SegmentRecord, SegmentSearchResult, SegmentValue};
