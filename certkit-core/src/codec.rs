//! Flat binary persistence for [`BalancedIndex`] contents.
//!
//! # Payload Layout
//!
//! The payload is a concatenation of records in the index's in-order
//! sequence. All integers are little-endian.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     key (u32, bit 31 clear)
//! 4       4     value_len (u32)
//! 8       N     value bytes (ValueCodec-defined)
//! ```
//!
//! Decoding rebuilds the index by re-inserting every record, so the decoded
//! tree has the same contents and key order but not necessarily the same
//! shape as the encoded one.

use crate::error::{StatusError, StatusResult};
use crate::index::{BalancedIndex, KEY_MASK};

/// Largest payload that will be encoded or decoded (5 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Size of the `key | value_len` record header.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Per-value encoding used by [`encode`] and [`decode`].
pub trait ValueCodec<V> {
    /// Number of bytes [`encode_into`](Self::encode_into) will write for `value`.
    fn encoded_len(&self, value: &V) -> usize;

    /// Writes `value` into `out` and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::BufferTooSmall`] when `out` is shorter than
    /// [`encoded_len`](Self::encoded_len).
    fn encode_into(&self, value: &V, out: &mut [u8]) -> StatusResult<usize>;

    /// Parses one value from exactly `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::MalformedRecord`] when `bytes` is not a valid
    /// encoding.
    fn decode(&self, bytes: &[u8]) -> StatusResult<V>;

    /// Disposes of a value discarded by a failed decode.
    fn release(&self, value: V) {
        drop(value);
    }
}

/// Serializes every value of `index` in key order.
///
/// A measure pass sizes the output before anything is written, so the
/// payload buffer is allocated once and never written past its end.
///
/// # Errors
///
/// - [`StatusError::TooLarge`] if the payload would exceed [`MAX_PAYLOAD_SIZE`]
/// - [`StatusError::AllocationFailed`] if the payload buffer cannot be allocated
/// - any error returned by the value codec
pub fn encode<V, C>(index: &BalancedIndex<V>, codec: &C) -> StatusResult<Vec<u8>>
where
    C: ValueCodec<V> + ?Sized,
{
    encode_with_limit(index, codec, MAX_PAYLOAD_SIZE)
}

pub(crate) fn encode_with_limit<V, C>(
    index: &BalancedIndex<V>,
    codec: &C,
    limit: usize,
) -> StatusResult<Vec<u8>>
where
    C: ValueCodec<V> + ?Sized,
{
    let mut total = 0usize;
    for (_, value) in index {
        total = total
            .checked_add(RECORD_HEADER_SIZE)
            .and_then(|sum| sum.checked_add(codec.encoded_len(value)))
            .ok_or(StatusError::TooLarge {
                size: usize::MAX,
                limit,
            })?;
    }
    if total > limit {
        return Err(StatusError::TooLarge { size: total, limit });
    }

    let mut out = Vec::new();
    out.try_reserve_exact(total)
        .map_err(|_| StatusError::AllocationFailed)?;
    out.resize(total, 0);

    let mut offset = 0usize;
    index.in_order_traverse(|key, value| {
        let value_len = codec.encoded_len(value);
        let end = offset + RECORD_HEADER_SIZE + value_len;
        if end > out.len() {
            return Err(StatusError::BufferTooSmall {
                needed: end - offset,
                available: out.len() - offset,
            });
        }
        let len_field = u32::try_from(value_len).map_err(|_| StatusError::TooLarge {
            size: value_len,
            limit,
        })?;

        out[offset..offset + 4].copy_from_slice(&(key & KEY_MASK).to_le_bytes());
        out[offset + 4..offset + 8].copy_from_slice(&len_field.to_le_bytes());
        let written = codec.encode_into(value, &mut out[offset + RECORD_HEADER_SIZE..end])?;
        if written != value_len {
            return Err(StatusError::malformed(format!(
                "value encoder wrote {written} bytes after measuring {value_len}"
            )));
        }
        offset = end;
        Ok(())
    })?;

    Ok(out)
}

/// Rebuilds an index from a payload produced by [`encode`].
///
/// Any malformed record fails the whole decode; values already decoded are
/// handed to [`ValueCodec::release`] before the error is returned.
///
/// # Errors
///
/// - [`StatusError::TooLarge`] if `bytes` exceeds [`MAX_PAYLOAD_SIZE`]
/// - [`StatusError::MalformedRecord`] on truncated records, keys with the
///   color bit set, or values the codec rejects
/// - [`StatusError::AllocationFailed`] if the index cannot grow
pub fn decode<V, C>(bytes: &[u8], codec: &C) -> StatusResult<BalancedIndex<V>>
where
    C: ValueCodec<V> + ?Sized,
{
    if bytes.len() > MAX_PAYLOAD_SIZE {
        return Err(StatusError::TooLarge {
            size: bytes.len(),
            limit: MAX_PAYLOAD_SIZE,
        });
    }

    let mut index = BalancedIndex::new();
    if let Err(err) = decode_into(bytes, codec, &mut index) {
        index.destroy_all(|value| codec.release(value));
        return Err(err);
    }
    Ok(index)
}

fn decode_into<V, C>(bytes: &[u8], codec: &C, index: &mut BalancedIndex<V>) -> StatusResult<()>
where
    C: ValueCodec<V> + ?Sized,
{
    let mut rest = bytes;
    while !rest.is_empty() {
        let record_offset = bytes.len() - rest.len();
        if rest.len() < RECORD_HEADER_SIZE {
            return Err(StatusError::malformed(format!(
                "truncated record header at offset {record_offset}"
            )));
        }
        let key = read_u32_le(&rest[0..4]);
        let value_len = read_u32_le(&rest[4..8]) as usize;
        if key & !KEY_MASK != 0 {
            return Err(StatusError::malformed(format!(
                "record key at offset {record_offset} uses the reserved color bit"
            )));
        }

        let available = rest.len() - RECORD_HEADER_SIZE;
        if value_len > available {
            return Err(StatusError::malformed(format!(
                "record at offset {record_offset} declares {value_len} value bytes, {available} remain"
            )));
        }
        let body = &rest[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + value_len];
        // reserve first so a decoded value is never dropped by a failed insert
        index.try_reserve(1)?;
        let value = codec.decode(body)?;
        index.insert(key, value)?;

        rest = &rest[RECORD_HEADER_SIZE + value_len..];
    }
    Ok(())
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
