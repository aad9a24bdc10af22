//! Segment Registry
//!
//! Maps timestamps to time segments and manages segment lifecycle against
//! the backing engine.
//!
//! ## Segments
//!
//! Time is cut into fixed-width spans: segment `id` owns timestamps
//! `[id * interval, (id + 1) * interval)`. Each live segment is one
//! engine keyspace named `<namespace>.<id>`; a key within it maps to the
//! packed multi-version value of that key (see the segment-value codec).
//!
//! Historical versions are assigned to segments by their *valid-to*
//! timestamp. That makes retention cheap: once the stream time has moved
//! far enough that a segment's whole range is past the retention horizon,
//! every version in it has expired and the keyspace is dropped in one
//! operation.
//!
//! ```text
//! interval = 10, retention = 100, stream time = 125
//!
//!   id 0      id 1      id 2            id 12
//! [0..10)   [10..20)  [20..30)  ...   [120..130)
//!  dropped ◄─┤ 19 < 125 - 100          live, current
//! ```
//!
//! ## Expiry
//!
//! Expiry runs lazily inside [`SegmentRegistry::get_or_create_if_live`],
//! the only registry call that observes stream time advancing. A segment
//! is *live* while its end lies at or after `stream_time - retention`;
//! requests for anything older return `None` and stale segments are
//! dropped in id order.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use tempora_core::Result;

use crate::engine::{KeyValueEngine, Keyspace};

/// Handle to one live segment.
#[derive(Debug, Clone)]
pub struct SegmentHandle {
    id: i64,
    keyspace: Keyspace,
}

impl SegmentHandle {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.keyspace.get(key)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.keyspace.put(key, value)
    }
}

/// The set of live segments backing one store.
pub struct SegmentRegistry {
    namespace: String,
    engine: Arc<dyn KeyValueEngine>,
    history_retention: i64,
    segment_interval: i64,
    /// Ids of live segments, ascending
    live: BTreeSet<i64>,
}

impl SegmentRegistry {
    /// Open the registry, recovering any segments already present in the
    /// engine and dropping those past the retention horizon for
    /// `stream_time`.
    pub fn open(
        engine: Arc<dyn KeyValueEngine>,
        namespace: String,
        history_retention: i64,
        segment_interval: i64,
        stream_time: i64,
    ) -> Result<Self> {
        let prefix = format!("{namespace}.");
        let mut live = BTreeSet::new();
        for name in engine.list_keyspaces(&prefix)? {
            if let Some(id) = name.strip_prefix(&prefix).and_then(|s| s.parse::<i64>().ok()) {
                live.insert(id);
            }
        }
        let mut registry = Self {
            namespace,
            engine,
            history_retention,
            segment_interval,
            live,
        };
        registry.expire_stale(stream_time)?;
        tracing::debug!(
            namespace = %registry.namespace,
            segments = registry.live.len(),
            "opened segment registry"
        );
        Ok(registry)
    }

    /// The segment owning `timestamp`.
    pub fn segment_id(&self, timestamp: i64) -> i64 {
        timestamp.div_euclid(self.segment_interval)
    }

    fn segment_end(&self, id: i64) -> i64 {
        (id + 1) * self.segment_interval - 1
    }

    fn keyspace_name(&self, id: i64) -> String {
        format!("{}.{}", self.namespace, id)
    }

    fn handle(&self, id: i64) -> SegmentHandle {
        SegmentHandle {
            id,
            keyspace: Keyspace::new(self.engine.clone(), self.keyspace_name(id)),
        }
    }

    /// Return the segment with the given id, creating it if needed, or
    /// `None` if its entire range is already past the retention horizon.
    pub fn get_or_create_if_live(
        &mut self,
        id: i64,
        stream_time: i64,
    ) -> Result<Option<SegmentHandle>> {
        if self.segment_end(id) < stream_time - self.history_retention {
            return Ok(None);
        }
        self.expire_stale(stream_time)?;
        if !self.live.contains(&id) {
            self.engine.create_keyspace(&self.keyspace_name(id))?;
            self.live.insert(id);
            tracing::debug!(namespace = %self.namespace, segment = id, "created segment");
        }
        Ok(Some(self.handle(id)))
    }

    /// All live segments whose range ends at or after `timestamp`, newest
    /// first.
    pub fn segments_covering_from(&self, timestamp: i64) -> Vec<SegmentHandle> {
        self.live
            .range(self.segment_id(timestamp)..)
            .rev()
            .map(|id| self.handle(*id))
            .collect()
    }

    /// Ids of all live segments, ascending.
    pub fn segment_ids(&self) -> Vec<i64> {
        self.live.iter().copied().collect()
    }

    /// Drop every segment whose range ended before the retention horizon.
    fn expire_stale(&mut self, stream_time: i64) -> Result<()> {
        let horizon = stream_time - self.history_retention;
        let stale: Vec<i64> = self
            .live
            .iter()
            .copied()
            .take_while(|id| self.segment_end(*id) < horizon)
            .collect();
        for id in stale {
            self.engine.drop_keyspace(&self.keyspace_name(id))?;
            self.live.remove(&id);
            tracing::debug!(namespace = %self.namespace, segment = id, "expired segment");
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.engine.flush()
    }

    pub fn close(&self) -> Result<()> {
        self.engine.close()
    }
}

impl std::fmt::Debug for SegmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentRegistry")
            .field("namespace", &self.namespace)
            .field("segment_interval", &self.segment_interval)
            .field("history_retention", &self.history_retention)
            .field("live", &self.live)
            .finish()
    }
}
