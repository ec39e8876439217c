//! Segment Module
//!
//! One append-only log file per numbered segment.
//!
//! ## Responsibilities
//! - Durable appends (flush + fsync before returning)
//! - Random-offset reads for `get`
//! - Sequential replay for merge (`scan`) and recovery (`build_index_entries`)
//! - Lifecycle: active → sealed (archived) → closed / deleted / renamed
//!
//! ## File Naming
//! ```text
//! {data_dir}/cask.db.<id>
//!   id >= 0 : active (highest id) or archived segment
//!   id <  0 : merge output that has not been renamed to its final id yet
//! ```
//!
//! Records are stored back to back with no padding and no trailing index,
//! see [`crate::entry`] for the record layout.

mod file;
mod index;
mod iterator;
mod reader;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::keydir::KeyDirEntry;

pub use file::Segment;
pub use iterator::SegmentIterator;

/// Prefix shared by every segment file name
pub const SEGMENT_PREFIX: &str = "cask.db";

/// How an incomplete trailing record is treated while walking a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailPolicy {
    /// Fail with `MalformedHeader` / `TruncatedRecord`
    Strict,

    /// Stop at the incomplete record and report how far the segment is valid
    Tolerate,
}

/// Index contribution of a single segment
#[derive(Debug, Default)]
pub struct SegmentIndex {
    /// Keys whose last record in this segment is a put
    pub live: HashMap<Vec<u8>, KeyDirEntry>,

    /// Keys whose last record in this segment is a tombstone
    pub deleted: HashSet<Vec<u8>>,

    /// Complete records walked (puts and tombstones)
    pub records: u64,

    /// Of which tombstones
    pub tombstones: u64,

    /// Offset just past the last complete record
    pub valid_len: u64,
}

/// Path of segment `id` inside `dir`
pub fn segment_path(dir: &Path, id: i64) -> PathBuf {
    dir.join(format!("{}.{}", SEGMENT_PREFIX, id))
}

/// Parse the segment id from a file name.
/// "cask.db.42" → Some(42), "cask.db.-1" → Some(-1)
pub fn parse_segment_id(path: &Path) -> Option<i64> {
    let name = path.file_name()?.to_str()?;
    let id_str = name.strip_prefix(SEGMENT_PREFIX)?.strip_prefix('.')?;
    id_str.parse().ok()
}

/// Make creations, renames and deletions inside `dir` durable
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    std::fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> Result<()> {
    // NTFS journals metadata; directories cannot be opened for fsync
    Ok(())
}
