//! Segment Iterator
//!
//! Sequential iteration over the live records of a segment.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::entry::{Entry, RecordKind};
use crate::error::Result;

use super::reader::{Next, RecordReader};

/// Iterator over `Put` records and their byte offsets.
///
/// Tombstones are consumed but not yielded. Corrupt or incomplete records end
/// the iteration with an error.
pub struct SegmentIterator {
    reader: RecordReader<BufReader<File>>,
    segment_id: i64,
    verify: bool,
    done: bool,
}

impl SegmentIterator {
    pub(super) fn open(path: &Path, segment_id: i64, verify: bool) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: RecordReader::new(BufReader::new(file), file_len),
            segment_id,
            verify,
            done: false,
        })
    }

    pub fn segment_id(&self) -> i64 {
        self.segment_id
    }

    fn advance(&mut self) -> Result<Option<(Entry, u64)>> {
        loop {
            let record = match self.reader.next_record()? {
                Next::Record(record) => record,
                Next::End => return Ok(None),
                Next::Torn(e) => return Err(e),
            };
            if record.header.kind == RecordKind::Tombstone {
                continue;
            }
            let entry = Entry::decode(&record.bytes, self.verify)?;
            return Ok(Some((entry, record.offset)));
        }
    }
}

impl Iterator for SegmentIterator {
    /// (entry, offset of its header)
    type Item = Result<(Entry, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
