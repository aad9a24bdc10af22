//! Latest-Value Codec
//!
//! Encoding for the latest-value tier, which maps each key to its single
//! current version. The stored value is the record timestamp concatenated
//! with the raw payload:
//!
//! ```text
//! ┌──────────────────────┬─────────────────┐
//! │ valid_from (8 bytes) │ value (N bytes) │
//! │ big-endian i64       │ raw payload     │
//! └──────────────────────┴─────────────────┘
//! ```
//!
//! Tombstones are never encoded here: a deleted key is simply absent from
//! the latest tier. The type signatures make encoding a tombstone
//! unrepresentable.

use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the timestamp prefix
pub const TIMESTAMP_SIZE: usize = 8;

/// Encode a value and its timestamp into a latest-tier value.
pub fn encode(value: &[u8], valid_from: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(TIMESTAMP_SIZE + value.len());
    buf.put_i64(valid_from);
    buf.put_slice(value);
    buf.freeze()
}

/// Read the timestamp prefix of an encoded latest-tier value.
pub fn timestamp(raw: &[u8]) -> Result<i64> {
    let prefix: [u8; TIMESTAMP_SIZE] = raw
        .get(..TIMESTAMP_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or(Error::TruncatedLatestValue(raw.len()))?;
    Ok(i64::from_be_bytes(prefix))
}

/// Slice the payload out of an encoded latest-tier value, without copying.
pub fn value(raw: &Bytes) -> Result<Bytes> {
    if raw.len() < TIMESTAMP_SIZE {
        return Err(Error::TruncatedLatestValue(raw.len()));
    }
    Ok(raw.slice(TIMESTAMP_SIZE..))
}
