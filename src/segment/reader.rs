//! Record reader
//!
//! Sequential header + payload reads shared by `scan` and the index walk.

use std::io::{self, Read};

use crate::entry::{verify_checksum, EntryHeader, CHECKSUM_SIZE, HEADER_SIZE};
use crate::error::{CaskError, Result};

/// One complete record as it sits on disk
pub(super) struct RawRecord {
    /// Offset of the header within the segment
    pub offset: u64,
    pub header: EntryHeader,
    /// Header + payload bytes
    pub bytes: Vec<u8>,
}

pub(super) enum Next {
    Record(RawRecord),
    /// Clean end of file on a record boundary
    End,
    /// End of file inside a record: a write that never completed
    Torn(CaskError),
}

/// Reads records back to back from the start of a segment
pub(super) struct RecordReader<R> {
    inner: R,
    offset: u64,
    file_len: u64,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R, file_len: u64) -> Self {
        Self {
            inner,
            offset: 0,
            file_len,
        }
    }

    /// Offset just past the last record returned
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn next_record(&mut self) -> Result<Next> {
        let mut header_buf = [0u8; HEADER_SIZE];
        let got = read_full(&mut self.inner, &mut header_buf)?;
        if got == 0 {
            return Ok(Next::End);
        }
        if got < HEADER_SIZE {
            return Ok(Next::Torn(CaskError::MalformedHeader(format!(
                "need {} bytes at offset {}, got {}",
                HEADER_SIZE, self.offset, got
            ))));
        }

        let header = EntryHeader::decode(&header_buf)?;
        let size = header.entry_size();

        // Checked against the file length before allocating, so a garbage
        // size field cannot trigger a huge allocation.
        let available = self.file_len.saturating_sub(self.offset);
        if size > available {
            return Ok(Next::Torn(CaskError::TruncatedRecord {
                expected: size,
                found: available,
            }));
        }

        let mut bytes = vec![0u8; size as usize];
        bytes[..HEADER_SIZE].copy_from_slice(&header_buf);
        let got = read_full(&mut self.inner, &mut bytes[HEADER_SIZE..])?;
        if got < bytes.len() - HEADER_SIZE {
            return Ok(Next::Torn(CaskError::TruncatedRecord {
                expected: size,
                found: (HEADER_SIZE + got) as u64,
            }));
        }

        let offset = self.offset;
        self.offset += size;
        Ok(Next::Record(RawRecord {
            offset,
            header,
            bytes,
        }))
    }
}

/// Fill `buf` unless EOF comes first; returns the number of bytes read
pub(super) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Start of the first complete, checksum-valid record anywhere in `buf`.
///
/// A torn append is the last thing in a segment, so intact records after a
/// record that runs past EOF mean its size field is corrupt instead.
pub(super) fn find_intact_record(buf: &[u8]) -> Option<usize> {
    let last_start = (buf.len() + 1).saturating_sub(HEADER_SIZE);
    (0..last_start).find(|&start| {
        let candidate = &buf[start..];
        let Ok(header) = EntryHeader::decode(candidate) else {
            return false;
        };
        let size = header.entry_size();
        size <= candidate.len() as u64
            && verify_checksum(&header, &candidate[CHECKSUM_SIZE..size as usize]).is_ok()
    })
}
