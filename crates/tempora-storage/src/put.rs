//! Put Algorithm
//!
//! Placing `(key, value, timestamp)` into the two-tier layout. Values may
//! arrive out of timestamp order, so the new version can land in the
//! latest tier, inside an existing segment value, or in a segment of its
//! own, and placing it may displace the previous version whose valid-to
//! the new record now defines.
//!
//! ## Phases
//!
//! 1. **Latest tier** ([`put_to_latest_tier`]): if the new record is at
//!    or past the current latest version it belongs in the latest tier;
//!    an older latest version is first demoted into the segment owning
//!    its new valid-to (the incoming timestamp).
//! 2. **Segment scan** ([`put_to_segments`]): otherwise walk segments
//!    newest first. A segment value whose `[min, next)` header range
//!    covers the timestamp owns the record. A segment value ending at or
//!    before it proves no older segment is affected, so the scan stops.
//!    Along the way, the smallest version timestamp seen that is still
//!    greater than the incoming timestamp is tracked: it is the new
//!    record's valid-to if no segment claims it.
//! 3. **Placement** ([`finish_put`]): with no version newer than the
//!    record, it is the latest overall (latest tier, or a fresh tombstone
//!    segment record for deletes). With a known valid-to, it goes into
//!    the segment owning that valid-to. Records whose valid-to already
//!    lies past the retention horizon are counted and dropped.
//!
//! ## Write ordering
//!
//! Whenever a version is copied toward an older location (latest tier →
//! segment, newer segment → older segment), the write to the older
//! location is persisted before the source is overwritten. A crash
//! between the two leaves a duplicated version, which log-replay
//! reconciles; the reverse order could lose the version entirely.

use bytes::Bytes;
use tempora_core::segment_value::{self, SegmentValue};
use tempora_core::{latest, Result};

use crate::client::{VersionedStoreClient, VersionedStoreSegment};
use crate::context::ExpiredRecordSensor;

/// Outcome of the latest-tier phase.
enum LatestTierStatus {
    /// The put is complete.
    Done,
    /// The record predates the latest tier; scan segments carrying the
    /// best valid-to candidate found so far.
    CheckSegments { found_ts: Option<i64> },
    /// A tombstone displaced the latest version; it still needs its own
    /// segment record, and nothing newer than it exists.
    PlaceTombstone,
}

/// Outcome of the segment-scan phase.
enum SegmentScanStatus {
    Done,
    Place { found_ts: Option<i64> },
}

/// Insert one version. `value == None` is a deletion (tombstone).
///
/// `stream_time` must already include `timestamp`; `found_ts` tracking
/// and all retention decisions are made against it.
pub fn do_put<C: VersionedStoreClient>(
    client: &mut C,
    sensor: Option<&ExpiredRecordSensor>,
    stream_time: i64,
    history_retention: i64,
    key: &[u8],
    value: Option<&[u8]>,
    timestamp: i64,
) -> Result<()> {
    debug_assert!(timestamp >= 0, "record timestamps are non-negative");
    match put_to_latest_tier(client, stream_time, key, value, timestamp)? {
        LatestTierStatus::Done => Ok(()),
        LatestTierStatus::PlaceTombstone => {
            finish_put(client, sensor, stream_time, key, value, timestamp, None)
        }
        LatestTierStatus::CheckSegments { found_ts } => {
            match put_to_segments(
                client,
                sensor,
                stream_time,
                history_retention,
                key,
                value,
                timestamp,
                found_ts,
            )? {
                SegmentScanStatus::Done => Ok(()),
                SegmentScanStatus::Place { found_ts } => {
                    finish_put(client, sensor, stream_time, key, value, timestamp, found_ts)
                }
            }
        }
    }
}

fn record_expired(sensor: Option<&ExpiredRecordSensor>, timestamp: i64) {
    if let Some(sensor) = sensor {
        sensor.record();
    }
    tracing::warn!(timestamp, "skipping record for expired put");
}

/// Write `value` as the newest version within `segment`, starting a new
/// segment value if the key has none there.
fn write_as_latest<S: VersionedStoreSegment>(
    segment: &S,
    key: &[u8],
    value: Option<&[u8]>,
    valid_from: i64,
    valid_to: i64,
) -> Result<()> {
    match segment.get(key)? {
        None => segment.put(
            key,
            &SegmentValue::with_record(value, valid_from, valid_to).serialize(),
        ),
        Some(raw) => {
            let mut sv = SegmentValue::deserialize(raw)?;
            sv.insert_as_latest(valid_from, valid_to, value)?;
            segment.put(key, &sv.serialize())
        }
    }
}

fn put_to_latest_tier<C: VersionedStoreClient>(
    client: &mut C,
    stream_time: i64,
    key: &[u8],
    value: Option<&[u8]>,
    timestamp: i64,
) -> Result<LatestTierStatus> {
    let Some(raw) = client.get_latest_value(key)? else {
        return Ok(LatestTierStatus::CheckSegments { found_ts: None });
    };
    let latest_ts = latest::timestamp(&raw)?;
    if timestamp < latest_ts {
        return Ok(LatestTierStatus::CheckSegments {
            found_ts: Some(latest_ts),
        });
    }

    if timestamp > latest_ts {
        // The current latest version gets valid-to = timestamp, which
        // places it in a segment. If that segment is already past
        // retention the version is simply dropped; the incoming record
        // itself is not expired (it is newer than the latest).
        let segment_id = client.segment_id_for_timestamp(timestamp);
        if let Some(segment) = client.get_or_create_segment_if_live(segment_id, stream_time)? {
            let displaced = latest::value(&raw)?;
            write_as_latest(&segment, key, Some(&displaced), latest_ts, timestamp)?;
        }
    }

    match value {
        Some(value) => {
            client.put_latest_value(key, &latest::encode(value, timestamp))?;
            Ok(LatestTierStatus::Done)
        }
        None => {
            client.delete_latest_value(key)?;
            if timestamp > latest_ts {
                Ok(LatestTierStatus::PlaceTombstone)
            } else {
                // Same-timestamp deletion supersedes the latest version in
                // place; there is no earlier valid-to left to update.
                Ok(LatestTierStatus::Done)
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn put_to_segments<C: VersionedStoreClient>(
    client: &mut C,
    sensor: Option<&ExpiredRecordSensor>,
    stream_time: i64,
    history_retention: i64,
    key: &[u8],
    value: Option<&[u8]>,
    timestamp: i64,
    mut found_ts: Option<i64>,
) -> Result<SegmentScanStatus> {
    for segment in client.reverse_segments(timestamp)? {
        let Some(raw) = segment.get(key)? else {
            continue;
        };
        let next_ts = segment_value::next_timestamp(&raw)?;
        if next_ts <= timestamp {
            // Everything here and in older segments ends at or before the
            // new record; nothing left to displace.
            return Ok(SegmentScanStatus::Place { found_ts });
        }
        let min_ts = segment_value::min_timestamp(&raw)?;
        if min_ts <= timestamp {
            put_to_segment(client, &segment, raw, key, value, timestamp, stream_time)?;
            return Ok(SegmentScanStatus::Done);
        }
        if min_ts < stream_time - history_retention {
            // The record would only extend history older than retention.
            record_expired(sensor, timestamp);
            return Ok(SegmentScanStatus::Done);
        }
        found_ts = Some(min_ts);
    }
    Ok(SegmentScanStatus::Place { found_ts })
}

/// Insert into a segment whose value's `[min, next)` range covers the
/// timestamp.
fn put_to_segment<C: VersionedStoreClient>(
    client: &mut C,
    segment: &C::Segment,
    raw: Bytes,
    key: &[u8],
    value: Option<&[u8]>,
    timestamp: i64,
    stream_time: i64,
) -> Result<()> {
    // The displaced predecessor's new valid-to is the incoming timestamp;
    // if that timestamp belongs to an older segment, the predecessor has
    // to move there.
    let target_id = client.segment_id_for_timestamp(timestamp);
    let move_needed = target_id != segment.id();

    let mut sv = SegmentValue::deserialize(raw)?;
    // The predecessor's payload is only needed if it moves.
    let hit = sv.find(timestamp, move_needed)?;

    if hit.valid_from == timestamp {
        // Same-timestamp supersede: no valid-to changes, no move.
        sv.update_record(timestamp, value, hit.index)?;
        return segment.put(key, &sv.serialize());
    }

    if move_needed {
        if let Some(older) = client.get_or_create_segment_if_live(target_id, stream_time)? {
            write_as_latest(&older, key, hit.value.as_deref(), hit.valid_from, timestamp)?;
        }
        sv.update_record(timestamp, value, hit.index)?;
        return segment.put(key, &sv.serialize());
    }

    sv.insert(timestamp, value, hit.index)?;
    segment.put(key, &sv.serialize())
}

fn finish_put<C: VersionedStoreClient>(
    client: &mut C,
    sensor: Option<&ExpiredRecordSensor>,
    stream_time: i64,
    key: &[u8],
    value: Option<&[u8]>,
    timestamp: i64,
    found_ts: Option<i64>,
) -> Result<()> {
    let Some(found_ts) = found_ts else {
        // Nothing newer exists: the record is the latest version overall.
        let Some(value) = value else {
            // Tombstones never enter the latest tier; they are recorded in
            // the segment owning their timestamp.
            let segment_id = client.segment_id_for_timestamp(timestamp);
            let Some(segment) = client.get_or_create_segment_if_live(segment_id, stream_time)?
            else {
                record_expired(sensor, timestamp);
                return Ok(());
            };
            return match segment.get(key)? {
                None => segment.put(
                    key,
                    &SegmentValue::with_record(None, timestamp, timestamp).serialize(),
                ),
                Some(raw) => {
                    let next_ts = segment_value::next_timestamp(&raw)?;
                    if next_ts == timestamp {
                        // History already ends exactly here; the tombstone
                        // is represented.
                        return Ok(());
                    }
                    let mut sv = SegmentValue::deserialize(raw)?;
                    sv.insert_as_latest(next_ts, timestamp, None)?;
                    segment.put(key, &sv.serialize())
                }
            };
        };
        return client.put_latest_value(key, &latest::encode(value, timestamp));
    };

    // found_ts is the new record's valid-to and selects its segment. The
    // record is the newest or the oldest entry there: a mid-value position
    // would have been claimed during the segment scan.
    let segment_id = client.segment_id_for_timestamp(found_ts);
    let Some(segment) = client.get_or_create_segment_if_live(segment_id, stream_time)? else {
        record_expired(sensor, timestamp);
        return Ok(());
    };
    match segment.get(key)? {
        None => segment.put(
            key,
            &SegmentValue::with_record(value, timestamp, found_ts).serialize(),
        ),
        Some(raw) => {
            let mut sv = SegmentValue::deserialize(raw)?;
            if sv.next_timestamp() <= timestamp {
                sv.insert_as_latest(timestamp, found_ts, value)?;
            } else {
                sv.insert_as_earliest(timestamp, value)?;
            }
            segment.put(key, &sv.serialize())
        }
    }
}
