//! Segment-Value Codec
//!
//! This module implements the binary format that packs every historical
//! version of one key within a time segment into a single stored value.
//!
//! ## Value Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (16 bytes)                                           │
//! │ - next_timestamp (8 bytes): valid-to of the newest record   │
//! │ - min_timestamp  (8 bytes): valid-from of the oldest record │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Descriptor table (12 bytes per record, newest first)        │
//! │ - valid_from (8 bytes)                                      │
//! │ - value_len  (4 bytes, signed; -1 marks a tombstone)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Value heap                                                  │
//! │ - payloads in reverse record order: the newest record's     │
//! │   payload ends at the end of the value, older payloads end  │
//! │   progressively earlier                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. There is no record count: the descriptor
//! table ends where the accumulated payload sizes meet the remaining
//! bytes, so prepending a record is a descriptor prepend plus a payload
//! append and the table never needs rewriting.
//!
//! ## Validity Intervals
//!
//! A record is valid from its own `valid_from` (inclusive) until the
//! `valid_from` of the next newer record (exclusive); the newest record's
//! valid-to is the header `next_timestamp`. Tombstones are records with
//! `value_len == -1` and no heap bytes.
//!
//! A *degenerate* value holds exactly one tombstone whose valid-from
//! equals `next_timestamp`: a zero-width interval, written when a key's
//! history begins with a deletion. Degenerate values are recognised by
//! `min_timestamp == next_timestamp`.
//!
//! ## Why This Design?
//!
//! ### Header-only pruning
//! `next_timestamp`/`min_timestamp` are readable without deserializing
//! the table, so point-in-time scans skip whole segments on two i64 reads.
//!
//! ### Newest-first descriptors
//! Most inserts and point lookups target the recent end of a key's
//! history; the search walks from the newest record and stops early.
//!
//! ## Usage
//!
//! ```ignore
//! let mut sv = SegmentValue::with_record(Some(b"v1"), 5, 15);
//! sv.insert_as_latest(15, 25, Some(b"v2"))?;
//!
//! let hit = sv.find(10, true)?;
//! assert_eq!(hit.valid_from, 5);
//!
//! engine.put(keyspace, key, &sv.serialize())?;
//! ```

use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Header size: next_timestamp + min_timestamp
pub const HEADER_SIZE: usize = 16;

/// Size of one record descriptor: valid_from + value_len
pub const DESCRIPTOR_SIZE: usize = 12;

/// value_len marker for tombstone records
pub const TOMBSTONE_LEN: i32 = -1;

/// Read the `next_timestamp` header field without deserializing.
pub fn next_timestamp(raw: &[u8]) -> Result<i64> {
    header_field(raw, 0)
}

/// Read the `min_timestamp` header field without deserializing.
pub fn min_timestamp(raw: &[u8]) -> Result<i64> {
    header_field(raw, 8)
}

fn header_field(raw: &[u8], offset: usize) -> Result<i64> {
    let field: [u8; 8] = raw
        .get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            Error::MalformedSegmentValue(format!("{} bytes is too short for a header", raw.len()))
        })?;
    Ok(i64::from_be_bytes(field))
}

fn encoded_len(value: Option<&[u8]>) -> i32 {
    value.map(|v| v.len() as i32).unwrap_or(TOMBSTONE_LEN)
}

/// One decoded record, as returned by [`SegmentValue::records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    pub valid_from: i64,
    pub valid_to: i64,
    /// `None` for tombstones
    pub value: Option<Bytes>,
}

/// Result of an ordered point-in-time search within one segment value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSearchResult {
    pub valid_from: i64,
    pub valid_to: i64,
    /// Position in the descriptor table, newest record first
    pub index: usize,
    /// The payload; `None` if the record is a tombstone or the search was
    /// asked not to decode values
    pub value: Option<Bytes>,
}

/// A packed multi-version value for one key.
///
/// Deserialization is lazy: only the header is decoded eagerly, the
/// descriptor table and heap are walked on demand.
#[derive(Debug, Clone)]
pub struct SegmentValue {
    next_ts: i64,
    min_ts: i64,
    /// Descriptor table followed by the value heap
    body: Bytes,
}

/// Walk state over the descriptor table.
struct Descriptor {
    index: usize,
    valid_from: i64,
    value_len: i32,
    /// Start of the payload within the body (equals its end for
    /// tombstones)
    value_start: usize,
}

impl SegmentValue {
    /// Build a value holding a single record.
    ///
    /// The degenerate form (`valid_from == valid_to`) is only meaningful
    /// for tombstones; a zero-width live record is a caller bug.
    pub fn with_record(value: Option<&[u8]>, valid_from: i64, valid_to: i64) -> Self {
        assert!(
            valid_from < valid_to || (value.is_none() && valid_from == valid_to),
            "segment record interval [{valid_from}, {valid_to}) is invalid"
        );
        let payload = value.unwrap_or(&[]);
        let mut body = BytesMut::with_capacity(DESCRIPTOR_SIZE + payload.len());
        body.put_i64(valid_from);
        body.put_i32(encoded_len(value));
        body.put_slice(payload);
        Self {
            next_ts: valid_to,
            min_ts: valid_from,
            body: body.freeze(),
        }
    }

    /// Decode the header of a stored value; the rest is read on demand.
    pub fn deserialize(raw: Bytes) -> Result<Self> {
        if raw.len() < HEADER_SIZE + DESCRIPTOR_SIZE {
            return Err(Error::MalformedSegmentValue(format!(
                "{} bytes is too short for a record",
                raw.len()
            )));
        }
        Ok(Self {
            next_ts: next_timestamp(&raw)?,
            min_ts: min_timestamp(&raw)?,
            body: raw.slice(HEADER_SIZE..),
        })
    }

    /// Encode back to the stored representation.
    pub fn serialize(&self) -> Bytes {
        let mut raw = BytesMut::with_capacity(HEADER_SIZE + self.body.len());
        raw.put_i64(self.next_ts);
        raw.put_i64(self.min_ts);
        raw.put_slice(&self.body);
        raw.freeze()
    }

    /// Valid-to of the newest record.
    pub fn next_timestamp(&self) -> i64 {
        self.next_ts
    }

    /// Valid-from of the oldest record.
    pub fn min_timestamp(&self) -> i64 {
        self.min_ts
    }

    fn is_degenerate(&self) -> bool {
        self.min_ts == self.next_ts
    }

    fn walk(&self) -> Walk<'_> {
        Walk {
            body: &self.body,
            pos: 0,
            cum: 0,
            index: 0,
        }
    }

    /// Locate the record whose validity interval contains `as_of`.
    ///
    /// The caller must ensure `min_timestamp <= as_of < next_timestamp`;
    /// anything else is a contract violation and panics. With
    /// `include_value == false` the heap is never touched and the returned
    /// `value` is `None`.
    pub fn find(&self, as_of: i64, include_value: bool) -> Result<SegmentSearchResult> {
        assert!(
            self.min_ts <= as_of && as_of < self.next_ts,
            "find({as_of}) outside [{}, {})",
            self.min_ts,
            self.next_ts
        );
        let mut curr_next = self.next_ts;
        let mut walk = self.walk();
        while let Some(d) = walk.next_descriptor()? {
            if d.valid_from <= as_of {
                let value = if include_value && d.value_len >= 0 {
                    Some(
                        self.body
                            .slice(d.value_start..d.value_start + d.value_len as usize),
                    )
                } else {
                    None
                };
                return Ok(SegmentSearchResult {
                    valid_from: d.valid_from,
                    valid_to: curr_next,
                    index: d.index,
                    value,
                });
            }
            curr_next = d.valid_from;
        }
        Err(Error::MalformedSegmentValue(format!(
            "no record at or before {as_of} despite min timestamp {}",
            self.min_ts
        )))
    }

    /// Prepend a record as the new newest version.
    ///
    /// `valid_from` must not precede the current `next_timestamp`. If it
    /// lies strictly after it, the uncovered interval was ended by a
    /// deletion, and a tombstone record is inserted to span it; otherwise
    /// the previous newest record's valid-to would silently stretch to
    /// `valid_from`. A degenerate value is replaced by the new record.
    pub fn insert_as_latest(
        &mut self,
        valid_from: i64,
        valid_to: i64,
        value: Option<&[u8]>,
    ) -> Result<()> {
        assert!(
            valid_from >= self.next_ts,
            "insert_as_latest({valid_from}) overlaps next timestamp {}",
            self.next_ts
        );
        assert!(valid_from < valid_to);
        if self.is_degenerate() {
            *self = Self::with_record(value, valid_from, valid_to);
            return Ok(());
        }
        if valid_from > self.next_ts {
            self.prepend(self.next_ts, None);
        }
        self.prepend(valid_from, value);
        self.next_ts = valid_to;
        Ok(())
    }

    /// Append a record as the new oldest version. Its valid-to is the
    /// previous `min_timestamp`, which must lie strictly after
    /// `valid_from`.
    pub fn insert_as_earliest(&mut self, valid_from: i64, value: Option<&[u8]>) -> Result<()> {
        assert!(
            valid_from < self.min_ts,
            "insert_as_earliest({valid_from}) does not precede min timestamp {}",
            self.min_ts
        );
        let table_end = self.descriptor_table_end()?;
        let payload = value.unwrap_or(&[]);
        let mut body =
            BytesMut::with_capacity(self.body.len() + DESCRIPTOR_SIZE + payload.len());
        body.put_slice(&self.body[..table_end]);
        body.put_i64(valid_from);
        body.put_i32(encoded_len(value));
        body.put_slice(payload);
        body.put_slice(&self.body[table_end..]);
        self.body = body.freeze();
        self.min_ts = valid_from;
        Ok(())
    }

    /// Insert a record at `index` in the descriptor table (0 is newest).
    /// The caller is responsible for an `index` that keeps valid-from
    /// strictly descending through the table.
    pub fn insert(&mut self, valid_from: i64, value: Option<&[u8]>, index: usize) -> Result<()> {
        let descriptors = self.descriptors()?;
        assert!(index <= descriptors.len(), "insert index out of bounds");
        if index == descriptors.len() {
            return self.insert_as_earliest(valid_from, value);
        }
        // Payloads of records newer than `index` occupy the body's tail;
        // the new payload slots in just before them.
        let tail = self.body.len() - self.cum_before(&descriptors, index);
        let payload = value.unwrap_or(&[]);
        let mut body =
            BytesMut::with_capacity(self.body.len() + DESCRIPTOR_SIZE + payload.len());
        body.put_slice(&self.body[..index * DESCRIPTOR_SIZE]);
        body.put_i64(valid_from);
        body.put_i32(encoded_len(value));
        body.put_slice(&self.body[index * DESCRIPTOR_SIZE..tail]);
        body.put_slice(payload);
        body.put_slice(&self.body[tail..]);
        self.body = body.freeze();
        Ok(())
    }

    /// Replace the record at `index` wholesale. Updating the oldest
    /// record refreshes `min_timestamp`.
    pub fn update_record(
        &mut self,
        valid_from: i64,
        value: Option<&[u8]>,
        index: usize,
    ) -> Result<()> {
        let descriptors = self.descriptors()?;
        assert!(index < descriptors.len(), "update index out of bounds");
        let old = &descriptors[index];
        let old_payload = old.value_len.max(0) as usize;
        let payload = value.unwrap_or(&[]);
        let mut body = BytesMut::with_capacity(
            self.body.len() - old_payload + payload.len(),
        );
        body.put_slice(&self.body[..index * DESCRIPTOR_SIZE]);
        body.put_i64(valid_from);
        body.put_i32(encoded_len(value));
        body.put_slice(&self.body[(index + 1) * DESCRIPTOR_SIZE..old.value_start]);
        body.put_slice(payload);
        body.put_slice(&self.body[old.value_start + old_payload..]);
        self.body = body.freeze();
        if index == descriptors.len() - 1 {
            self.min_ts = valid_from;
        }
        Ok(())
    }

    /// Decode every record, newest first, with derived valid-to bounds.
    pub fn records(&self) -> Result<Vec<SegmentRecord>> {
        let mut records = Vec::new();
        let mut curr_next = self.next_ts;
        let mut walk = self.walk();
        while let Some(d) = walk.next_descriptor()? {
            let value = if d.value_len >= 0 {
                Some(
                    self.body
                        .slice(d.value_start..d.value_start + d.value_len as usize),
                )
            } else {
                None
            };
            records.push(SegmentRecord {
                valid_from: d.valid_from,
                valid_to: curr_next,
                value,
            });
            curr_next = d.valid_from;
        }
        Ok(records)
    }

    fn prepend(&mut self, valid_from: i64, value: Option<&[u8]>) {
        let payload = value.unwrap_or(&[]);
        let mut body =
            BytesMut::with_capacity(self.body.len() + DESCRIPTOR_SIZE + payload.len());
        body.put_i64(valid_from);
        body.put_i32(encoded_len(value));
        body.put_slice(&self.body);
        body.put_slice(payload);
        self.body = body.freeze();
    }

    fn descriptors(&self) -> Result<Vec<Descriptor>> {
        let mut descriptors = Vec::new();
        let mut walk = self.walk();
        while let Some(d) = walk.next_descriptor()? {
            descriptors.push(d);
        }
        Ok(descriptors)
    }

    fn descriptor_table_end(&self) -> Result<usize> {
        Ok(self.descriptors()?.len() * DESCRIPTOR_SIZE)
    }

    /// Total heap bytes of records newer than `index`.
    fn cum_before(&self, descriptors: &[Descriptor], index: usize) -> usize {
        descriptors[..index]
            .iter()
            .map(|d| d.value_len.max(0) as usize)
            .sum()
    }
}

struct Walk<'a> {
    body: &'a [u8],
    pos: usize,
    cum: usize,
    index: usize,
}

impl Walk<'_> {
    fn next_descriptor(&mut self) -> Result<Option<Descriptor>> {
        let len = self.body.len();
        if self.pos + self.cum == len {
            return Ok(None);
        }
        if self.pos + DESCRIPTOR_SIZE + self.cum > len {
            return Err(Error::MalformedSegmentValue(format!(
                "descriptor at {} overlaps value heap",
                self.pos
            )));
        }
        let valid_from = i64::from_be_bytes(self.body[self.pos..self.pos + 8].try_into().unwrap());
        let value_len =
            i32::from_be_bytes(self.body[self.pos + 8..self.pos + 12].try_into().unwrap());
        let payload = value_len.max(0) as usize;
        if self.pos + DESCRIPTOR_SIZE + self.cum + payload > len {
            return Err(Error::MalformedSegmentValue(format!(
                "record {} claims {} payload bytes beyond the value",
                self.index, payload
            )));
        }
        let d = Descriptor {
            index: self.index,
            valid_from,
            value_len,
            value_start: len - self.cum - payload,
        };
        self.pos += DESCRIPTOR_SIZE;
        self.cum += payload;
        self.index += 1;
        Ok(Some(d))
    }
}
