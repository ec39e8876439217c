//! Merge (compaction)
//!
//! Rewrites archived segments so only the latest live record of each key is
//! kept, then swaps the rewritten segments in for the originals.
//!
//! ## Sequence
//! ```text
//! 1. copy    scan archived segments in replay order; copy a record iff the
//!            key index still points at its (segment_id, offset)
//!            → output segments -1, -2, … (rotated at the size threshold)
//! 2. seal    fsync every output segment
//! 3. repoint index entries of copied keys now point at the output
//! 4. delete  remove every original archived segment, fsync the directory
//! 5. rename  output -n → n - 1, retarget the index, fsync the directory
//! ```
//! Originals are only deleted after step 2, so a crash before that leaves
//! them intact. `merge` never touches the active segment. Output left behind
//! by a crash is merged again on the next open, which may move the active
//! segment to a higher id.

use std::path::PathBuf;

use crate::entry::Entry;
use crate::error::{CaskError, Result};
use crate::keydir::KeyDirEntry;
use crate::segment::{sync_dir, Segment};

use super::{replay_order, DataStore};

/// Outcome of a merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Archived segments consumed
    pub segments_merged: usize,

    /// Compacted segments produced
    pub segments_written: usize,

    /// Live records copied into the output
    pub records_copied: u64,

    /// Archived bytes before the merge
    pub bytes_before: u64,

    /// Archived bytes after the merge
    pub bytes_after: u64,
}

/// Copied record waiting for the index to be repointed
type Relocation = (Vec<u8>, KeyDirEntry);

impl DataStore {
    /// Compact every archived segment.
    ///
    /// After a successful merge each key keeps its value, archived segments
    /// are renumbered `0..n` and no pre-merge archived file remains.
    pub fn merge(&mut self) -> Result<MergeReport> {
        self.compact(false)
    }

    /// Redo a merge that crashed before its output was renamed.
    ///
    /// Adopted output keeps negative ids, which replay after every
    /// non-negative segment. Left in place, it would shadow writes archived
    /// after this open, so it is folded into regular segments right away.
    /// The active segment may move to a higher id to make room.
    pub(super) fn finish_interrupted_merge(&mut self) -> Result<MergeReport> {
        tracing::warn!(
            archived = ?self.archived_segment_ids(),
            "finishing interrupted merge"
        );
        self.compact(true)
    }

    fn compact(&mut self, may_move_active: bool) -> Result<MergeReport> {
        let originals = replay_order(self.archived.keys().copied());
        if originals.is_empty() {
            tracing::debug!("nothing to merge");
            return Ok(MergeReport::default());
        }
        let bytes_before = self.archived_size();

        // Output ids continue below any merge output adopted on open
        let first_output_id = self
            .archived
            .keys()
            .next()
            .map_or(-1, |&lowest| lowest.min(0) - 1);

        let mut writer = MergeWriter::new(
            self.config.data_dir.clone(),
            self.config.segment_size_threshold,
            first_output_id,
        );
        let staged = self
            .copy_live_records(&originals, &mut writer)
            .and_then(|relocated| Ok((relocated, writer.finish()?)));
        let (relocated, outputs) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                writer.abort();
                return Err(e);
            }
        };

        let final_ids: Vec<(i64, i64)> = outputs
            .iter()
            .map(|segment| (segment.id(), first_output_id - segment.id()))
            .collect();
        let highest_final = final_ids.last().map(|&(_, to)| to);
        if let Some(highest) = highest_final {
            if highest >= self.active.id() && !may_move_active {
                for segment in outputs {
                    segment.delete()?;
                }
                return Err(CaskError::Merge(format!(
                    "final segment id {} would collide with active segment {}",
                    highest,
                    self.active.id()
                )));
            }
        }

        let records_copied = relocated.len() as u64;
        let bytes_after: u64 = outputs.iter().map(Segment::write_cursor).sum();

        // Output is durable: point the index at it before originals go away
        for (key, location) in relocated {
            self.keydir.insert(key, location);
        }
        for segment in outputs {
            self.archived.insert(segment.id(), segment);
        }

        for id in &originals {
            if let Some(segment) = self.archived.remove(id) {
                segment.delete()?;
            }
        }
        sync_dir(&self.config.data_dir)?;

        if let Some(highest) = highest_final {
            if highest >= self.active.id() {
                self.move_active(highest + 1)?;
            }
        }

        for &(from, to) in &final_ids {
            let mut segment = self
                .archived
                .remove(&from)
                .ok_or(CaskError::UnknownSegment(from))?;
            let renamed = segment.rename(&self.config.data_dir, to);
            self.keydir.retarget_segment(from, segment.id());
            self.archived.insert(segment.id(), segment);
            renamed?;
        }
        sync_dir(&self.config.data_dir)?;

        let report = MergeReport {
            segments_merged: originals.len(),
            segments_written: final_ids.len(),
            records_copied,
            bytes_before,
            bytes_after,
        };
        tracing::info!(
            merged = report.segments_merged,
            written = report.segments_written,
            records = report.records_copied,
            bytes_before = report.bytes_before,
            bytes_after = report.bytes_after,
            "merge complete"
        );
        Ok(report)
    }

    /// Give the active segment a higher id so merge output can take the ids
    /// below it. Only done while opening; no other archived ids exist by now.
    fn move_active(&mut self, new_id: i64) -> Result<()> {
        let from = self.active.id();
        let renamed = self.active.rename(&self.config.data_dir, new_id);
        self.keydir.retarget_segment(from, self.active.id());
        renamed?;
        tracing::warn!(from, to = new_id, "moved active segment above merge output");
        Ok(())
    }

    /// Step 1: copy every record that is still the latest version of its key
    fn copy_live_records(
        &self,
        originals: &[i64],
        writer: &mut MergeWriter,
    ) -> Result<Vec<Relocation>> {
        let mut relocated = Vec::new();

        for &id in originals {
            let segment = self
                .archived
                .get(&id)
                .ok_or(CaskError::UnknownSegment(id))?;

            for item in segment.scan(self.config.verify_checksums)? {
                let (entry, offset) = item?;
                if !self.keydir.points_at(&entry.key, id, offset) {
                    continue;
                }

                let encoded = entry.encode()?;
                let (new_id, new_offset) = writer.append(&encoded)?;
                let Entry { key, timestamp, .. } = entry;
                relocated.push((
                    key,
                    KeyDirEntry::new(new_id, new_offset, encoded.len() as u64, timestamp),
                ));
            }
        }

        Ok(relocated)
    }
}

/// Writes merge output, rotating under the same threshold rule as the store
struct MergeWriter {
    dir: PathBuf,
    threshold: u64,
    next_id: i64,
    current: Option<Segment>,
    finished: Vec<Segment>,
}

impl MergeWriter {
    fn new(dir: PathBuf, threshold: u64, first_id: i64) -> Self {
        Self {
            dir,
            threshold,
            next_id: first_id,
            current: None,
            finished: Vec::new(),
        }
    }

    fn append(&mut self, data: &[u8]) -> Result<(i64, u64)> {
        let size = data.len() as u64;
        let full = self
            .current
            .as_ref()
            .map_or(false, |s| !s.is_empty() && s.write_cursor() + size > self.threshold);
        if full {
            if let Some(segment) = self.current.take() {
                self.finished.push(segment);
            }
        }

        let segment = match self.current.take() {
            Some(segment) => segment,
            None => {
                let segment = Segment::open(&self.dir, self.next_id)?;
                self.next_id -= 1;
                segment
            }
        };
        let segment = self.current.insert(segment);
        let offset = segment.append(data)?;
        Ok((segment.id(), offset))
    }

    /// Seal every output segment, in creation order
    fn finish(&mut self) -> Result<Vec<Segment>> {
        if let Some(segment) = self.current.take() {
            self.finished.push(segment);
        }
        for segment in &mut self.finished {
            segment.seal()?;
        }
        Ok(std::mem::take(&mut self.finished))
    }

    /// Remove whatever output was written; originals stay authoritative
    fn abort(&mut self) {
        let segments = self.current.take().into_iter().chain(self.finished.drain(..));
        for segment in segments {
            let id = segment.id();
            if let Err(e) = segment.delete() {
                tracing::warn!(segment_id = id, error = %e, "failed to remove merge output");
            }
        }
    }
}
