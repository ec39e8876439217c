//! Key Index Module
//!
//! In-memory map from every live key to the location of its latest record.
//!
//! ## Responsibilities
//! - O(1) lookups for `get`
//! - Rebuilt from segments on open (replay order, last writer wins)
//! - Tie-break source for merge: a record survives iff the index points at it
//!
//! ## Data Structure Choice
//! A plain `HashMap`: no ordering is required since range queries are out of
//! scope. The store owns the only instance and never hands out `&mut`.

mod table;

pub use table::KeyDir;

/// Location of the latest live record for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDirEntry {
    /// Segment holding the record
    pub segment_id: i64,

    /// Byte offset of the record header within the segment
    pub offset: u64,

    /// Header + key + value, i.e. the span to re-read the record
    pub entry_size: u64,

    /// Unix seconds at write time
    pub timestamp: u32,
}

impl KeyDirEntry {
    pub fn new(segment_id: i64, offset: u64, entry_size: u64, timestamp: u32) -> Self {
        Self {
            segment_id,
            offset,
            entry_size,
            timestamp,
        }
    }
}
