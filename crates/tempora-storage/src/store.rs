//! Versioned Store Facade
//!
//! `VersionedStore` ties the pieces together: the latest-value keyspace,
//! the segment registry, the observed stream time, and the retention
//! configuration.
//!
//! ## Architecture
//!
//! ```text
//! VersionedStore
//!     │
//!     ├─ Keyspace "<name>.latestValues"   (current version per key)
//!     │
//!     └─ SegmentRegistry "<name>.segments"
//!          ├─ Keyspace "<name>.segments.4"
//!          ├─ Keyspace "<name>.segments.5"
//!          └─ ...
//! ```
//!
//! ## Stream time
//!
//! The store tracks the largest timestamp it has seen across `put` and
//! `delete` calls. History retention is measured against this *observed
//! stream time*, never against the wall clock, so a paused stream does
//! not silently expire state.
//!
//! ## Lifecycle
//!
//! `flush` persists segments before the latest tier: if only the segment
//! flush survives a crash, a version may exist in both tiers, which is
//! reconcilable, whereas the reverse order could lose it. `close` closes
//! the latest tier first, so in-flight reads fail fast with
//! [`tempora_core::Error::NotOpen`]: every read path touches the latest
//! tier first.
//!
//! ## Threading
//!
//! The store is owned and driven by a single task; only the open flag is
//! shared with other threads and it is atomic.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = Arc::new(MemoryEngine::new());
//! let context = Arc::new(StoreContext::new(state_dir));
//! let mut store = VersionedStore::open("orders", StoreConfig::default(), engine, context)?;
//!
//! store.put(b"k", Some(b"v1"), 100)?;
//! store.put(b"k", Some(b"v2"), 200)?;
//!
//! assert_eq!(store.get(b"k")?.unwrap().valid_from, 200);
//! assert_eq!(store.get_as_of(b"k", 150)?.unwrap().valid_from, 100);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempora_core::{Result, Timestamp, VersionedRecord, NO_TIMESTAMP};

use crate::client::LiveStoreClient;
use crate::config::StoreConfig;
use crate::context::StoreContext;
use crate::engine::{KeyValueEngine, Keyspace};
use crate::get;
use crate::put;
use crate::segments::SegmentRegistry;

/// A persistent versioned key-value store.
pub struct VersionedStore {
    name: String,
    config: StoreConfig,
    context: Arc<StoreContext>,
    latest: Keyspace,
    segments: SegmentRegistry,
    observed_stream_time: Timestamp,
    open: AtomicBool,
}

impl VersionedStore {
    /// Open the store on the given engine, recovering any persisted
    /// segments.
    pub fn open(
        name: impl Into<String>,
        config: StoreConfig,
        engine: Arc<dyn KeyValueEngine>,
        context: Arc<StoreContext>,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();

        let latest_name = format!("{name}.latestValues");
        engine.create_keyspace(&latest_name)?;
        let latest = Keyspace::new(engine.clone(), latest_name);

        let segments = SegmentRegistry::open(
            engine,
            format!("{name}.segments"),
            config.history_retention_ms,
            config.segment_interval_ms,
            NO_TIMESTAMP,
        )?;

        tracing::info!(
            store = %name,
            state_dir = %context.state_dir().display(),
            history_retention_ms = config.history_retention_ms,
            segment_interval_ms = config.segment_interval_ms,
            "opened versioned store"
        );

        Ok(Self {
            name,
            config,
            context,
            latest,
            segments,
            observed_stream_time: NO_TIMESTAMP,
            open: AtomicBool::new(true),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// The store keeps its state in the backing engine, not on the heap.
    pub fn persistent(&self) -> bool {
        true
    }

    /// Insert a version of `key`. `None` records a deletion.
    ///
    /// Advances the observed stream time, which may expire segments whose
    /// range has fallen out of history retention.
    pub fn put(&mut self, key: &[u8], value: Option<&[u8]>, timestamp: Timestamp) -> Result<()> {
        self.observed_stream_time = self.observed_stream_time.max(timestamp);
        let stream_time = self.observed_stream_time;
        let mut client = LiveStoreClient::new(&self.latest, &mut self.segments);
        put::do_put(
            &mut client,
            Some(self.context.expired_records()),
            stream_time,
            self.config.history_retention_ms,
            key,
            value,
            timestamp,
        )
    }

    /// Delete `key` as of `timestamp`, returning the value that was
    /// visible at that timestamp beforehand.
    pub fn delete(&mut self, key: &[u8], timestamp: Timestamp) -> Result<Option<VersionedRecord>> {
        let existing = self.get_as_of(key, timestamp)?;
        self.put(key, None, timestamp)?;
        Ok(existing)
    }

    /// Current value of `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<VersionedRecord>> {
        get::get_latest(&self.latest, key)
    }

    /// Value of `key` as of the given timestamp.
    pub fn get_as_of(&self, key: &[u8], as_of: Timestamp) -> Result<Option<VersionedRecord>> {
        get::get_as_of(
            &self.latest,
            &self.segments,
            self.observed_stream_time,
            self.config.history_retention_ms,
            key,
            as_of,
        )
    }

    /// Persist pending writes: segments first, then the latest tier.
    pub fn flush(&self) -> Result<()> {
        self.segments.flush()?;
        self.latest.flush()
    }

    /// Close the store. Data-path calls fail afterwards.
    pub fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        self.latest.close()?;
        self.segments.close()?;
        tracing::info!(store = %self.name, "closed versioned store");
        Ok(())
    }
}

impl std::fmt::Debug for VersionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedStore")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("observed_stream_time", &self.observed_stream_time)
            .field("open", &self.is_open())
            .finish()
    }
}
