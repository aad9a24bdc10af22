//! Versioned-Store Client
//!
//! The write path is expressed against a narrow client trait rather than
//! the store's concrete tiers. The put algorithm needs exactly six
//! operations, and extracting them into [`VersionedStoreClient`] lets the
//! same algorithm drive the live store today and a restore-time sandbox
//! later without duplicating any logic.

use bytes::Bytes;
use tempora_core::Result;

use crate::engine::Keyspace;
use crate::segments::{SegmentHandle, SegmentRegistry};

/// A segment as the write path sees it.
pub trait VersionedStoreSegment {
    fn id(&self) -> i64;

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
}

impl VersionedStoreSegment for SegmentHandle {
    fn id(&self) -> i64 {
        SegmentHandle::id(self)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        SegmentHandle::get(self, key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        SegmentHandle::put(self, key, value)
    }
}

/// The operations the put algorithm needs from a store.
pub trait VersionedStoreClient {
    type Segment: VersionedStoreSegment;

    /// Encoded value-and-timestamp from the latest tier, if any.
    fn get_latest_value(&self, key: &[u8]) -> Result<Option<Bytes>>;

    fn put_latest_value(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete_latest_value(&mut self, key: &[u8]) -> Result<()>;

    /// The segment with the given id, created on demand, or `None` if it
    /// is past the retention horizon.
    fn get_or_create_segment_if_live(
        &mut self,
        segment_id: i64,
        stream_time: i64,
    ) -> Result<Option<Self::Segment>>;

    /// Segments whose range ends at or after `timestamp`, newest first.
    fn reverse_segments(&self, timestamp: i64) -> Result<Vec<Self::Segment>>;

    fn segment_id_for_timestamp(&self, timestamp: i64) -> i64;
}

/// Client over the live store's tiers.
#[derive(Debug)]
pub struct LiveStoreClient<'a> {
    latest: &'a Keyspace,
    segments: &'a mut SegmentRegistry,
}

impl<'a> LiveStoreClient<'a> {
    pub fn new(latest: &'a Keyspace, segments: &'a mut SegmentRegistry) -> Self {
        Self { latest, segments }
    }
}

impl VersionedStoreClient for LiveStoreClient<'_> {
    type Segment = SegmentHandle;

    fn get_latest_value(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.latest.get(key)
    }

    fn put_latest_value(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.latest.put(key, value)
    }

    fn delete_latest_value(&mut self, key: &[u8]) -> Result<()> {
        self.latest.delete(key)
    }

    fn get_or_create_segment_if_live(
        &mut self,
        segment_id: i64,
        stream_time: i64,
    ) -> Result<Option<SegmentHandle>> {
        self.segments.get_or_create_if_live(segment_id, stream_time)
    }

    fn reverse_segments(&self, timestamp: i64) -> Result<Vec<SegmentHandle>> {
        Ok(self.segments.segments_covering_from(timestamp))
    }

    fn segment_id_for_timestamp(&self, timestamp: i64) -> i64 {
        self.segments.segment_id(timestamp)
    }
}
