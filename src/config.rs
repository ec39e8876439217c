//! Configuration for caskdb
//!
//! Centralized configuration with sensible defaults. The engine only consumes a
//! resolved `Config`; loading it from files or the environment is up to the caller.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CaskError, Result};

/// Default segment size threshold: 64 MiB
pub const DEFAULT_SEGMENT_SIZE_THRESHOLD: u64 = 64 << 20;

/// Default advisory merge interval: one hour
pub const DEFAULT_MERGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Main configuration for a caskdb store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files. Must exist before the store opens.
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── cask.db.0     (archived segment)
    ///     ├── cask.db.1     (archived segment)
    ///     └── cask.db.2     (active segment, highest id)
    pub data_dir: PathBuf,

    /// Max size of a segment (in bytes) before the active one is rotated
    pub segment_size_threshold: u64,

    // -------------------------------------------------------------------------
    // Merge Configuration
    // -------------------------------------------------------------------------
    /// How often an external scheduler should call `merge()`.
    /// Advisory only: the store never merges on its own.
    pub merge_interval: Duration,

    // -------------------------------------------------------------------------
    // Integrity Configuration
    // -------------------------------------------------------------------------
    /// Verify record checksums on reads and during index rebuild
    pub verify_checksums: bool,

    /// Truncate an incomplete trailing record of the active segment on open
    /// instead of refusing to open
    pub repair_torn_tail: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./caskdb_data"),
            segment_size_threshold: DEFAULT_SEGMENT_SIZE_THRESHOLD,
            merge_interval: DEFAULT_MERGE_INTERVAL,
            verify_checksums: true,
            repair_torn_tail: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the store cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.segment_size_threshold == 0 {
            return Err(CaskError::Config(
                "segment_size_threshold must be positive".to_string(),
            ));
        }
        if self.merge_interval.is_zero() {
            return Err(CaskError::Config(
                "merge_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Convert a size given in MiB (as the CLI takes it) to bytes
pub fn megabytes_to_bytes(mb: u64) -> Result<u64> {
    mb.checked_mul(1024 * 1024).ok_or_else(|| {
        CaskError::Config(format!("segment size of {} MB does not fit in 64 bits", mb))
    })
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment size threshold (in bytes)
    pub fn segment_size_threshold(mut self, size: u64) -> Self {
        self.config.segment_size_threshold = size;
        self
    }

    /// Set the advisory merge interval
    pub fn merge_interval(mut self, interval: Duration) -> Self {
        self.config.merge_interval = interval;
        self
    }

    /// Set the advisory merge interval in whole seconds
    pub fn merge_interval_secs(mut self, secs: u64) -> Self {
        self.config.merge_interval = Duration::from_secs(secs);
        self
    }

    /// Enable or disable checksum verification
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.config.verify_checksums = verify;
        self
    }

    /// Enable or disable torn-tail repair of the active segment
    pub fn repair_torn_tail(mut self, repair: bool) -> Self {
        self.config.repair_torn_tail = repair;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
