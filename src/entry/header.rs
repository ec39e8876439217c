//! Entry header
//!
//! Fixed 17-byte prefix of every record, plus the closed set of record kinds.

use bytes::{Buf, BufMut};

use crate::error::{CaskError, Result};

/// Header size: Checksum (4) + Kind (1) + Timestamp (4) + KeySize (4) + ValueSize (4)
pub const HEADER_SIZE: usize = 17;

/// Bytes occupied by the checksum field; everything after it is checksummed
pub(crate) const CHECKSUM_SIZE: usize = 4;

/// Kind of a record stored in a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// A live key-value pair
    Put = 0,

    /// Marks the key as deleted (value is empty)
    Tombstone = 1,
}

impl RecordKind {
    /// Map an on-disk tag to a kind; unknown tags are a malformed header
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(RecordKind::Put),
            1 => Ok(RecordKind::Tombstone),
            other => Err(CaskError::MalformedHeader(format!(
                "unknown record kind tag {}",
                other
            ))),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded form of the fixed-width record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// CRC32 over every byte that follows the checksum field
    pub checksum: u32,
    pub kind: RecordKind,
    /// Unix seconds at write time
    pub timestamp: u32,
    pub key_size: u32,
    pub value_size: u32,
}

impl EntryHeader {
    /// Parse the first `HEADER_SIZE` bytes of `buf`.
    ///
    /// Only the prefix is inspected, so recovery can learn the payload sizes
    /// before reading the payload itself.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CaskError::MalformedHeader(format!(
                "need {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let mut cursor = &buf[..HEADER_SIZE];
        let checksum = cursor.get_u32();
        let kind = RecordKind::from_u8(cursor.get_u8())?;
        let timestamp = cursor.get_u32();
        let key_size = cursor.get_u32();
        let value_size = cursor.get_u32();

        Ok(Self {
            checksum,
            kind,
            timestamp,
            key_size,
            value_size,
        })
    }

    /// Write the header in wire order (big-endian)
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32(self.checksum);
        buf.put_u8(self.kind.as_u8());
        buf.put_u32(self.timestamp);
        buf.put_u32(self.key_size);
        buf.put_u32(self.value_size);
    }

    /// Number of key + value bytes following the header
    pub fn payload_size(&self) -> u64 {
        self.key_size as u64 + self.value_size as u64
    }

    /// Full byte span of the record, header included
    pub fn entry_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.payload_size()
    }
}
