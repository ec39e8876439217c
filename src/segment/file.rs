//! Segment file handle
//!
//! Owns the open file, the write cursor and the sealed/closed state.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{CaskError, Result};

use super::iterator::SegmentIterator;
use super::reader::read_full;
use super::segment_path;

/// An append-only log file backing one numbered segment
///
/// ## Concurrency:
/// - Mutations (`append`, `seal`, `truncate`, `rename`) take `&mut self`
/// - `read_at` takes `&self`; the handle sits behind a Mutex because a
///   positioned read is a seek followed by a read
pub struct Segment {
    id: i64,
    path: PathBuf,

    /// `None` once closed
    file: Mutex<Option<File>>,

    /// End of the last durable record; offset of the next append
    write_cursor: u64,

    /// Sealed segments are archived and never appended to again
    sealed: bool,
}

impl Segment {
    /// Open segment `id` in `dir`, creating an empty file if needed.
    ///
    /// The write cursor is recovered from the file length.
    pub fn open(dir: &Path, id: i64) -> Result<Self> {
        let path = segment_path(dir, id);
        let file = open_file(&path)?;
        let write_cursor = file.metadata()?.len();

        tracing::debug!(segment_id = id, size = write_cursor, "opened segment");

        Ok(Self {
            id,
            path,
            file: Mutex::new(Some(file)),
            write_cursor,
            sealed: false,
        })
    }

    /// Append encoded record bytes and make them durable.
    ///
    /// Returns the offset the record was written at. On failure the file is
    /// cut back to the previous cursor so no partial record stays behind.
    pub fn append(&mut self, data: &[u8]) -> Result<u64> {
        if self.sealed {
            return Err(CaskError::SegmentSealed(self.id));
        }
        let file = self
            .file
            .get_mut()
            .as_mut()
            .ok_or(CaskError::SegmentClosed(self.id))?;

        let write = file
            .write_all(data)
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_all());
        if let Err(e) = write {
            if let Err(rollback) = file.set_len(self.write_cursor) {
                tracing::warn!(
                    segment_id = self.id,
                    error = %rollback,
                    "failed to roll back partial append"
                );
            }
            return Err(e.into());
        }

        let offset = self.write_cursor;
        self.write_cursor += data.len() as u64;
        Ok(offset)
    }

    /// Read exactly `len` bytes starting at `offset`
    pub fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(CaskError::SegmentClosed(self.id))?;

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        let got = read_full(file, &mut buf)?;
        if got < buf.len() {
            return Err(CaskError::ShortRead {
                segment_id: self.id,
                offset,
                wanted: len,
                got: got as u64,
            });
        }
        Ok(buf)
    }

    /// Replay the segment from byte 0, yielding live `Put` records with their offsets.
    ///
    /// Each call reads through a fresh handle, so scans are restartable and
    /// independent of `read_at`.
    pub fn scan(&self, verify: bool) -> Result<SegmentIterator> {
        SegmentIterator::open(&self.path, self.id, verify)
    }

    /// Make the segment immutable (active → archived)
    pub fn seal(&mut self) -> Result<()> {
        if self.sealed {
            return Ok(());
        }
        if let Some(file) = self.file.get_mut().as_mut() {
            file.flush()?;
            file.sync_all()?;
        }
        self.sealed = true;
        tracing::debug!(segment_id = self.id, size = self.write_cursor, "sealed segment");
        Ok(())
    }

    /// Cut the file back to `len` bytes (drops an incomplete trailing record)
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        if self.sealed {
            return Err(CaskError::SegmentSealed(self.id));
        }
        if len > self.write_cursor {
            return Err(CaskError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate segment {} to {} bytes, it only has {}",
                    self.id, len, self.write_cursor
                ),
            )));
        }
        let file = self
            .file
            .get_mut()
            .as_mut()
            .ok_or(CaskError::SegmentClosed(self.id))?;
        file.set_len(len)?;
        file.sync_all()?;
        self.write_cursor = len;
        Ok(())
    }

    /// Move the file to the name of `new_id` and reopen it there.
    ///
    /// If the rename fails the segment is reopened under its old id.
    pub fn rename(&mut self, dir: &Path, new_id: i64) -> Result<()> {
        self.close()?;

        let new_path = segment_path(dir, new_id);
        let renamed = fs::rename(&self.path, &new_path);
        if renamed.is_ok() {
            tracing::debug!(from = self.id, to = new_id, "renamed segment");
            self.path = new_path;
            self.id = new_id;
        }

        *self.file.get_mut() = Some(open_file(&self.path)?);
        renamed?;
        Ok(())
    }

    /// Flush, sync and release the file handle. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.get_mut().take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Close the handle and remove the file
    pub fn delete(mut self) -> Result<()> {
        self.close()?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(segment_id = self.id, "deleted segment");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes, which is also the next append offset
    pub fn write_cursor(&self) -> u64 {
        self.write_cursor
    }

    pub fn is_empty(&self) -> bool {
        self.write_cursor == 0
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(segment_id = self.id, error = %e, "failed to close segment");
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("write_cursor", &self.write_cursor)
            .field("sealed", &self.sealed)
            .finish()
    }
}

fn open_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
}
