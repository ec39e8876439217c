//! Entry Codec Module
//!
//! Binary encoding of a single record stored in a segment.
//!
//! ## Responsibilities
//! - Fixed-width big-endian header followed by the payload
//! - CRC32 checksum over everything except the checksum field itself
//! - Header-only decoding for recovery walks
//!
//! ## Record Format
//! ```text
//! ┌──────────────┬──────────┬───────────────┬──────────────┬────────────────┐
//! │ Checksum (4) │ Kind (1) │ Timestamp (4) │ KeySize (4)  │ ValueSize (4)  │
//! ├──────────────┴──────────┴───────────────┴──────────────┴────────────────┤
//! │ Key (KeySize bytes) | Value (ValueSize bytes)                            │
//! └──────────────────────────────────────────────────────────────────────────┘
//!   Kind: 0 = Put, 1 = Tombstone (empty value)
//! ```

mod header;

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CaskError, Result};

pub use header::{EntryHeader, RecordKind, HEADER_SIZE};
pub(crate) use header::CHECKSUM_SIZE;

/// A single record as written to a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,

    /// Empty for tombstones
    pub value: Vec<u8>,

    /// Unix seconds when the record was written
    pub timestamp: u32,

    pub kind: RecordKind,
}

impl Entry {
    /// A live key-value record
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, timestamp: u32) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            timestamp,
            kind: RecordKind::Put,
        }
    }

    /// A deletion marker for `key`
    pub fn tombstone(key: impl Into<Vec<u8>>, timestamp: u32) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            timestamp,
            kind: RecordKind::Tombstone,
        }
    }

    /// Encoded size in bytes (header + key + value)
    pub fn size(&self) -> u64 {
        entry_size(self.key.len(), self.value.len())
    }

    /// Encode into header + payload.
    ///
    /// The buffer length is the entry size that goes into the key index.
    pub fn encode(&self) -> Result<Bytes> {
        let key_size = size_field(self.key.len())?;
        let value_size = size_field(self.value.len())?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.key.len() + self.value.len());
        EntryHeader {
            checksum: 0,
            kind: self.kind,
            timestamp: self.timestamp,
            key_size,
            value_size,
        }
        .encode_into(&mut buf);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);

        let checksum = crc32fast::hash(&buf[CHECKSUM_SIZE..]);
        buf[..CHECKSUM_SIZE].copy_from_slice(&checksum.to_be_bytes());

        Ok(buf.freeze())
    }

    /// Decode one record from the start of `buf`.
    ///
    /// Fails with `TruncatedRecord` when `buf` is shorter than the sizes the
    /// header declares. With `verify` the checksum is recomputed and compared.
    pub fn decode(buf: &[u8], verify: bool) -> Result<Self> {
        let header = EntryHeader::decode(buf)?;
        let size = header.entry_size();

        if (buf.len() as u64) < size {
            return Err(CaskError::TruncatedRecord {
                expected: size,
                found: buf.len() as u64,
            });
        }
        let record = &buf[..size as usize];

        if verify {
            verify_checksum(&header, &record[CHECKSUM_SIZE..])?;
        }

        let key_end = HEADER_SIZE + header.key_size as usize;
        Ok(Self {
            key: record[HEADER_SIZE..key_end].to_vec(),
            value: record[key_end..].to_vec(),
            timestamp: header.timestamp,
            kind: header.kind,
        })
    }
}

/// Encoded size of a record with the given key and value lengths
pub fn entry_size(key_len: usize, value_len: usize) -> u64 {
    HEADER_SIZE as u64 + key_len as u64 + value_len as u64
}

/// Compare the stored checksum against the bytes it covers
/// (header fields after the checksum, then the payload)
pub(crate) fn verify_checksum(header: &EntryHeader, covered: &[u8]) -> Result<()> {
    let computed = crc32fast::hash(covered);
    if computed != header.checksum {
        return Err(CaskError::ChecksumMismatch {
            stored: header.checksum,
            computed,
        });
    }
    Ok(())
}

/// Current wall-clock time in unix seconds, saturating at `u32::MAX`
pub fn current_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn size_field(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| CaskError::RecordTooLarge(len))
}
