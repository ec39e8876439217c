//! Error types for caskdb
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using CaskError
pub type Result<T> = std::result::Result<T, CaskError>;

/// Unified error type for caskdb operations
#[derive(Debug, Error)]
pub enum CaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Format Errors
    // -------------------------------------------------------------------------
    #[error("Malformed entry header: {0}")]
    MalformedHeader(String),

    #[error("Truncated record: expected {expected} bytes, found {found}")]
    TruncatedRecord { expected: u64, found: u64 },

    #[error("Checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("Record too large: {0} bytes does not fit a 32-bit size field")]
    RecordTooLarge(usize),

    // -------------------------------------------------------------------------
    // Segment Errors
    // -------------------------------------------------------------------------
    #[error("Short read in segment {segment_id} at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead {
        segment_id: i64,
        offset: u64,
        wanted: u64,
        got: u64,
    },

    #[error("Segment {0} is sealed")]
    SegmentSealed(i64),

    #[error("Segment {0} is closed")]
    SegmentClosed(i64),

    #[error("Segment {0} is not open in this store")]
    UnknownSegment(i64),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Key must not be empty")]
    EmptyKey,

    #[error("Data directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("Merge failed: {0}")]
    Merge(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaskError {
    /// True for errors caused by corrupt or incomplete on-disk records
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CaskError::MalformedHeader(_)
                | CaskError::TruncatedRecord { .. }
                | CaskError::ChecksumMismatch { .. }
        )
    }
}
