//! Store Module
//!
//! The data store that coordinates segments and the key index.
//!
//! ## Responsibilities
//! - Recover the segment set and rebuild the key index on open
//! - Route put/get/delete to the active segment and the index
//! - Rotate the active segment at the size threshold
//! - Compact archived segments (`merge`)

mod merge;
mod recovery;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::entry::{current_timestamp, Entry};
use crate::error::{CaskError, Result};
use crate::keydir::{KeyDir, KeyDirEntry};
use crate::segment::Segment;

pub use merge::MergeReport;
pub use recovery::RecoveryReport;

/// The main data store
///
/// ## Concurrency Model: Single Writer
///
/// - **Writes** (put/delete/merge/close): take `&mut self`, so the caller
///   serializes them; there is no internal write lock.
/// - **Reads** (get/keys): take `&self`. Segment handles are behind a Mutex,
///   so several threads may `get` concurrently from a shared `&DataStore`.
/// - Separate processes must not open the same directory.
pub struct DataStore {
    /// Store configuration
    config: Config,

    /// The only segment accepting appends (highest id)
    active: Segment,

    /// Open handles of archived segments, keyed by segment id
    archived: BTreeMap<i64, Segment>,

    /// Key → location of the latest live record
    keydir: KeyDir,

    /// What happened while opening
    recovery: RecoveryReport,
}

impl DataStore {
    /// Open the store in `config.data_dir`
    ///
    /// On startup:
    /// 1. List segment files; the highest non-negative id is active
    /// 2. Replay archived segments, leftover merge output, then the active one
    /// 3. Repair an incomplete trailing record of the active segment (if enabled)
    /// 4. Merge again if an interrupted merge left output behind
    /// 5. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let recovered = recovery::recover(&config)?;

        let mut store = Self {
            config,
            active: recovered.active,
            archived: recovered.archived,
            keydir: recovered.keydir,
            recovery: recovered.report,
        };
        if store.recovery.merge_segments_adopted > 0 {
            store.finish_interrupted_merge()?;
        }
        Ok(store)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Get the value of `key`, or `None` if it is absent or deleted
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(location) = self.keydir.get(key) else {
            return Ok(None);
        };

        let segment = self.segment(location.segment_id)?;
        let bytes = segment.read_at(location.offset, location.entry_size)?;
        let entry = Entry::decode(&bytes, self.config.verify_checksums)?;
        Ok(Some(entry.value))
    }

    /// Store a key-value pair
    ///
    /// The index only changes after the record is durable.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::EmptyKey);
        }

        let entry = Entry::put(key, value, current_timestamp());
        let encoded = entry.encode()?;
        let (segment_id, offset) = self.append_with_rotation(&encoded)?;

        self.keydir.insert(
            entry.key,
            KeyDirEntry::new(segment_id, offset, encoded.len() as u64, entry.timestamp),
        );
        Ok(())
    }

    /// Delete a key (missing keys are a no-op)
    ///
    /// A tombstone is persisted so the deletion survives an index rebuild.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::EmptyKey);
        }

        let entry = Entry::tombstone(key, current_timestamp());
        let encoded = entry.encode()?;
        self.append_with_rotation(&encoded)?;

        self.keydir.remove(key);
        Ok(())
    }

    /// Keys currently in the index, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.keydir.keys()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.keydir.contains_key(key)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.keydir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keydir.is_empty()
    }

    /// Append to the active segment, rotating first when needed.
    ///
    /// Boundary rule: rotate iff the active segment is non-empty and
    /// `write_cursor + size > segment_size_threshold`. An empty active segment
    /// always takes the record, so a record larger than the threshold gets a
    /// segment of its own and no empty segments are left behind. A segment
    /// sealed by a rotation that failed half way is rotated away on the next
    /// append.
    ///
    /// Returns `(segment_id, offset)` of the written record.
    fn append_with_rotation(&mut self, data: &[u8]) -> Result<(i64, u64)> {
        let size = data.len() as u64;
        let full = !self.active.is_empty()
            && self.active.write_cursor() + size > self.config.segment_size_threshold;
        if full || self.active.is_sealed() {
            self.rotate()?;
        }

        let offset = self.active.append(data)?;
        Ok((self.active.id(), offset))
    }

    /// Seal the active segment, archive it and start `id + 1`
    fn rotate(&mut self) -> Result<()> {
        self.active.seal()?;
        let next = Segment::open(&self.config.data_dir, self.active.id() + 1)?;
        let sealed = std::mem::replace(&mut self.active, next);

        tracing::debug!(
            archived = sealed.id(),
            active = self.active.id(),
            size = sealed.write_cursor(),
            "rotated active segment"
        );
        self.archived.insert(sealed.id(), sealed);
        Ok(())
    }

    /// Segment holding records of `id`, active or archived
    fn segment(&self, id: i64) -> Result<&Segment> {
        if id == self.active.id() {
            return Ok(&self.active);
        }
        self.archived.get(&id).ok_or(CaskError::UnknownSegment(id))
    }

    /// Close the store gracefully
    ///
    /// Syncs and releases every segment handle
    pub fn close(mut self) -> Result<()> {
        self.active.close()?;
        for segment in self.archived.values_mut() {
            segment.close()?;
        }
        tracing::debug!(dir = %self.config.data_dir.display(), "closed store");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Advisory interval for an external merge scheduler
    pub fn merge_interval(&self) -> Duration {
        self.config.merge_interval
    }

    pub fn active_segment_id(&self) -> i64 {
        self.active.id()
    }

    /// Ids of archived segments, ascending
    pub fn archived_segment_ids(&self) -> Vec<i64> {
        self.archived.keys().copied().collect()
    }

    /// Active plus archived segments
    pub fn segment_count(&self) -> usize {
        self.archived.len() + 1
    }

    /// Total bytes across all segments
    pub fn disk_size(&self) -> u64 {
        self.active.write_cursor()
            + self
                .archived
                .values()
                .map(Segment::write_cursor)
                .sum::<u64>()
    }

    /// Total bytes across archived segments only
    pub fn archived_size(&self) -> u64 {
        self.archived.values().map(Segment::write_cursor).sum()
    }

    /// Get the report produced while opening
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }
}

/// Order in which segments are replayed: non-negative ids ascending, then
/// merge output `-1, -2, …`
fn replay_order(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_by_key(|&id| (id < 0, id.unsigned_abs()));
    ids
}
