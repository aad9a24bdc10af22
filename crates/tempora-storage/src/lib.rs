//! Tempora Storage Layer
//!
//! A persistent versioned key-value store for stream processors: every
//! `put` carries a timestamp, and queries can ask for the current value
//! of a key or for its value *as of* any timestamp within the configured
//! history retention.
//!
//! ## Two-tier layout
//!
//! ```text
//! put(key, value, ts) ──► VersionedStore
//!                             │
//!              ┌──────────────┴───────────────┐
//!              ▼                              ▼
//!       latest tier                    segment tier
//!   key -> newest version      time-segmented history: key ->
//!   (one entry per key)        packed older versions, grouped
//!                              by when each version *ended*
//! ```
//!
//! Grouping history by end timestamp is what makes retention cheap:
//! once a segment's whole time range ages past the retention horizon,
//! every version in it is expired and the segment is dropped wholesale.
//!
//! ## Main components
//!
//! - [`VersionedStore`]: the facade (`put` / `delete` / `get` /
//!   `get_as_of` / `flush` / `close`)
//! - [`KeyValueEngine`]: the seam to the backing storage engine, with
//!   the bundled [`MemoryEngine`]
//! - [`SegmentRegistry`]: timestamp-to-segment mapping and expiry
//! - [`VersionedStoreClient`]: the narrow interface the put algorithm is
//!   written against, shared between live operation and restore
//!
//! The data formats (latest-value and segment-value codecs) live in
//! `tempora-core`.

pub mod client;
pub mod config;
pub mod context;
pub mod engine;
pub mod get;
pub mod put;
pub mod segments;
pub mod store;

pub use client::{LiveStoreClient, VersionedStoreClient, VersionedStoreSegment};
pub use config::StoreConfig;
pub use context::{ExpiredRecordSensor, StoreContext};
pub use engine::{KeyValueEngine, Keyspace, MemoryEngine};
pub use segments::{SegmentHandle, SegmentRegistry};
pub use store::VersionedStore;

pub use tempora_core::{Error, Result, Timestamp, VersionedRecord};
