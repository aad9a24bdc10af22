//! Get Algorithms
//!
//! Read paths over the two-tier layout. The latest tier is authoritative
//! for current values, so a plain get is a single keyspace read. An as-of
//! get prunes with the segment-value headers so that at most one segment
//! value is deserialized:
//!
//! 1. Queries older than the retention horizon answer `None` outright,
//!    even when data is physically still present, so results do not
//!    depend on expiry timing.
//! 2. The latest tier answers if its version started at or before the
//!    queried time.
//! 3. Otherwise segments are scanned newest first. A segment value whose
//!    versions all end at or before the queried time proves that older
//!    segments cannot answer either; one that starts after it defers to
//!    older segments; anything else contains the answer (possibly a
//!    tombstone).

use tempora_core::segment_value::{self, SegmentValue};
use tempora_core::{latest, Result, VersionedRecord};

use crate::engine::Keyspace;
use crate::segments::SegmentRegistry;

/// Current value of `key`, if any.
pub fn get_latest(latest_tier: &Keyspace, key: &[u8]) -> Result<Option<VersionedRecord>> {
    let Some(raw) = latest_tier.get(key)? else {
        return Ok(None);
    };
    Ok(Some(VersionedRecord::new(
        latest::value(&raw)?,
        latest::timestamp(&raw)?,
    )))
}

/// Value of `key` as of `as_of`, if any version was valid then and is
/// still within history retention.
pub fn get_as_of(
    latest_tier: &Keyspace,
    segments: &SegmentRegistry,
    stream_time: i64,
    history_retention: i64,
    key: &[u8],
    as_of: i64,
) -> Result<Option<VersionedRecord>> {
    if as_of < stream_time - history_retention {
        return Ok(None);
    }

    if let Some(raw) = latest_tier.get(key)? {
        let latest_ts = latest::timestamp(&raw)?;
        if latest_ts <= as_of {
            return Ok(Some(VersionedRecord::new(latest::value(&raw)?, latest_ts)));
        }
    }

    for segment in segments.segments_covering_from(as_of) {
        let Some(raw) = segment.get(key)? else {
            continue;
        };
        let next_ts = segment_value::next_timestamp(&raw)?;
        if next_ts <= as_of {
            // This key's history ends before the queried time here, so it
            // ends before it in every older segment too.
            return Ok(None);
        }
        if segment_value::min_timestamp(&raw)? > as_of {
            continue;
        }
        let hit = SegmentValue::deserialize(raw)?.find(as_of, true)?;
        return Ok(hit
            .value
            .map(|value| VersionedRecord::new(value, hit.valid_from)));
    }

    Ok(None)
}
