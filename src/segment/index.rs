//! Index extraction
//!
//! Walks a segment header by header and collects the key index contribution.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::entry::{verify_checksum, RecordKind, CHECKSUM_SIZE, HEADER_SIZE};
use crate::error::Result;
use crate::keydir::KeyDirEntry;

use super::reader::{find_intact_record, Next, RecordReader};
use super::{Segment, SegmentIndex, TailPolicy};

impl Segment {
    /// Compute `(segment_id, offset, entry_size, timestamp)` for every record.
    ///
    /// Only puts end up in `live`; a key whose last record here is a
    /// tombstone lands in `deleted` instead. Precedence across segments is the
    /// caller's job (absorb segments in replay order).
    pub fn build_index_entries(&self, verify: bool, tail: TailPolicy) -> Result<SegmentIndex> {
        let file = File::open(self.path())?;
        let file_len = file.metadata()?.len();
        let mut reader = RecordReader::new(BufReader::new(file), file_len);
        let mut index = SegmentIndex::default();

        loop {
            let record = match reader.next_record()? {
                Next::Record(record) => record,
                Next::End => break,
                Next::Torn(e) => match tail {
                    TailPolicy::Strict => return Err(e),
                    TailPolicy::Tolerate if self.has_records_after(reader.offset())? => {
                        tracing::error!(
                            segment_id = self.id(),
                            offset = reader.offset(),
                            error = %e,
                            "record size runs past end of segment but intact records follow"
                        );
                        return Err(e);
                    }
                    TailPolicy::Tolerate => {
                        tracing::warn!(
                            segment_id = self.id(),
                            offset = reader.offset(),
                            error = %e,
                            "incomplete record at end of segment"
                        );
                        break;
                    }
                },
            };

            if verify {
                verify_checksum(&record.header, &record.bytes[CHECKSUM_SIZE..])?;
            }

            let key_end = HEADER_SIZE + record.header.key_size as usize;
            let key = record.bytes[HEADER_SIZE..key_end].to_vec();
            index.records += 1;

            match record.header.kind {
                RecordKind::Put => {
                    index.deleted.remove(&key);
                    index.live.insert(
                        key,
                        KeyDirEntry::new(
                            self.id(),
                            record.offset,
                            record.header.entry_size(),
                            record.header.timestamp,
                        ),
                    );
                }
                RecordKind::Tombstone => {
                    index.tombstones += 1;
                    index.live.remove(&key);
                    index.deleted.insert(key);
                }
            }
        }

        index.valid_len = reader.offset();
        Ok(index)
    }

    /// True if a complete record starts anywhere after `offset`
    fn has_records_after(&self, offset: u64) -> Result<bool> {
        let mut file = File::open(self.path())?;
        file.seek(SeekFrom::Start(offset + 1))?;
        let mut rest = Vec::new();
        file.read_to_end(&mut rest)?;
        Ok(find_intact_record(&rest).is_some())
    }
}
