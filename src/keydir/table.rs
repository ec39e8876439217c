//! KeyDir implementation
//!
//! HashMap-based key index.

use std::collections::HashMap;

use crate::segment::SegmentIndex;

use super::KeyDirEntry;

/// In-memory index of live keys
#[derive(Debug, Default)]
pub struct KeyDir {
    entries: HashMap<Vec<u8>, KeyDirEntry>,
}

impl KeyDir {
    /// Create a new empty KeyDir
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the location of `key`
    pub fn get(&self, key: &[u8]) -> Option<&KeyDirEntry> {
        self.entries.get(key)
    }

    /// Insert or replace the location of `key`, returning the previous one
    pub fn insert(&mut self, key: Vec<u8>, entry: KeyDirEntry) -> Option<KeyDirEntry> {
        self.entries.insert(key, entry)
    }

    /// Remove `key`; absent keys are fine
    pub fn remove(&mut self, key: &[u8]) -> Option<KeyDirEntry> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over the keys currently indexed (no particular order)
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.entries.keys().map(|k| k.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &KeyDirEntry)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply one segment's contribution on top of what is already indexed.
    ///
    /// Segments must be absorbed in replay order: live keys overwrite earlier
    /// locations, keys whose last record in the segment is a tombstone are removed.
    pub fn absorb(&mut self, index: SegmentIndex) {
        for key in index.deleted {
            self.entries.remove(&key);
        }
        self.entries.extend(index.live);
    }

    /// True iff the latest record of `key` is the one at `(segment_id, offset)`
    pub fn points_at(&self, key: &[u8], segment_id: i64, offset: u64) -> bool {
        self.entries
            .get(key)
            .map_or(false, |e| e.segment_id == segment_id && e.offset == offset)
    }

    /// Move every entry of segment `from` to segment `to`, keeping offsets.
    /// Returns the number of entries updated.
    pub fn retarget_segment(&mut self, from: i64, to: i64) -> usize {
        let mut updated = 0;
        for entry in self.entries.values_mut() {
            if entry.segment_id == from {
                entry.segment_id = to;
                updated += 1;
            }
        }
        updated
    }
}
