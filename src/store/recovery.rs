//! Store recovery
//!
//! Discovers the segment set and rebuilds the key index on open.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{CaskError, Result};
use crate::keydir::KeyDir;
use crate::segment::{parse_segment_id, Segment, SegmentIndex, TailPolicy};

use super::replay_order;

/// Result of opening a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Segments replayed, active included
    pub segments_loaded: usize,

    /// Complete records replayed (puts and tombstones)
    pub records_replayed: u64,

    /// Of which tombstones
    pub tombstones_replayed: u64,

    /// Bytes cut from the tail of the active segment
    pub truncated_bytes: u64,

    /// Merge output from an interrupted merge that was kept and replayed
    pub merge_segments_adopted: usize,

    /// Merge output from an interrupted merge that was corrupt and deleted
    pub merge_segments_discarded: usize,
}

impl RecoveryReport {
    fn record(&mut self, index: &SegmentIndex) {
        self.segments_loaded += 1;
        self.records_replayed += index.records;
        self.tombstones_replayed += index.tombstones;
    }
}

pub(super) struct Recovered {
    pub active: Segment,
    pub archived: BTreeMap<i64, Segment>,
    pub keydir: KeyDir,
    pub report: RecoveryReport,
}

pub(super) fn recover(config: &Config) -> Result<Recovered> {
    let dir = config.data_dir.as_path();
    if !dir.is_dir() {
        return Err(CaskError::MissingDirectory(dir.to_path_buf()));
    }
    let verify = config.verify_checksums;

    let ids = discover_segment_ids(dir)?;
    let (mut stable, merge_output): (Vec<i64>, Vec<i64>) =
        replay_order(ids).into_iter().partition(|&id| id >= 0);

    // Highest non-negative id is active. A directory holding nothing but merge
    // output starts its active segment above the ids that output will take.
    let active_id = stable.pop().unwrap_or(merge_output.len() as i64);

    let mut keydir = KeyDir::new();
    let mut archived = BTreeMap::new();
    let mut report = RecoveryReport::default();

    for id in stable {
        let mut segment = Segment::open(dir, id)?;
        segment.seal()?;
        let index = segment.build_index_entries(verify, TailPolicy::Strict)?;
        report.record(&index);
        keydir.absorb(index);
        archived.insert(id, segment);
    }

    if !merge_output.is_empty() {
        adopt_merge_output(dir, &merge_output, verify, &mut keydir, &mut archived, &mut report)?;
    }

    let mut active = Segment::open(dir, active_id)?;
    let tail = if config.repair_torn_tail {
        TailPolicy::Tolerate
    } else {
        TailPolicy::Strict
    };
    let index = active.build_index_entries(verify, tail)?;
    if index.valid_len < active.write_cursor() {
        let cut = active.write_cursor() - index.valid_len;
        tracing::warn!(
            segment_id = active_id,
            valid_len = index.valid_len,
            truncated_bytes = cut,
            "truncating incomplete record at end of active segment"
        );
        active.truncate(index.valid_len)?;
        report.truncated_bytes = cut;
    }
    report.record(&index);
    keydir.absorb(index);

    tracing::info!(
        dir = %dir.display(),
        active = active_id,
        archived = archived.len(),
        keys = keydir.len(),
        records = report.records_replayed,
        "opened store"
    );

    Ok(Recovered {
        active,
        archived,
        keydir,
        report,
    })
}

/// Deal with segments left behind by an interrupted merge.
///
/// Merge output only holds records that were the latest version of their key
/// when copied, so replaying it after the other archived segments is correct
/// whether or not the originals were deleted yet. Corrupt output means the
/// merge never sealed it, so the originals are all still there and the output
/// is thrown away.
fn adopt_merge_output(
    dir: &Path,
    ids: &[i64],
    verify: bool,
    keydir: &mut KeyDir,
    archived: &mut BTreeMap<i64, Segment>,
    report: &mut RecoveryReport,
) -> Result<()> {
    let mut staged = Vec::with_capacity(ids.len());
    let mut corrupt = None;

    for &id in ids {
        let segment = Segment::open(dir, id)?;
        match segment.build_index_entries(verify, TailPolicy::Strict) {
            Ok(index) => staged.push((segment, index)),
            Err(e) if e.is_corruption() => {
                corrupt = Some((id, e));
                staged.push((segment, SegmentIndex::default()));
            }
            Err(e) => return Err(e),
        }
    }

    if let Some((id, error)) = corrupt {
        tracing::warn!(
            segment_id = id,
            error = %error,
            discarded = staged.len(),
            "discarding merge output from interrupted merge"
        );
        report.merge_segments_discarded = staged.len();
        for (segment, _) in staged {
            segment.delete()?;
        }
        return Ok(());
    }

    tracing::warn!(
        segments = staged.len(),
        "adopting merge output from interrupted merge"
    );
    report.merge_segments_adopted = staged.len();
    for (mut segment, index) in staged {
        segment.seal()?;
        report.record(&index);
        keydir.absorb(index);
        archived.insert(segment.id(), segment);
    }
    Ok(())
}

/// Ids of every `cask.db.<id>` file in `dir`
fn discover_segment_ids(dir: &Path) -> Result<Vec<i64>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Some(id) = parse_segment_id(&path) {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}
