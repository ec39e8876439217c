//! # caskdb
//!
//! A Bitcask-style, append-only key-value storage engine with:
//! - Sequential, fsync'd appends to numbered segment files
//! - An in-memory key index pointing at each key's latest record
//! - CRC32-checked records and index rebuild on open
//! - Segment rotation at a size threshold and manual compaction (`merge`)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        DataStore                             │
//! │          put / get / delete / keys / merge / close           │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!         ┌─────────────┐                ┌─────────────┐
//!         │   KeyDir    │                │  Segments   │
//!         │ key → (id,  │ ─────────────▶ │ active +    │
//!         │  offset)    │                │ archived    │
//!         └─────────────┘                └──────┬──────┘
//!                                               │
//!                                               ▼
//!                                        ┌─────────────┐
//!                                        │    Entry    │
//!                                        │   (codec)   │
//!                                        └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use caskdb::{Config, DataStore};
//!
//! # fn main() -> caskdb::Result<()> {
//! std::fs::create_dir_all("./caskdb_data")?;
//! let mut store = DataStore::open(Config::builder().data_dir("./caskdb_data").build())?;
//! store.put(b"hello", b"world")?;
//! assert_eq!(store.get(b"hello")?, Some(b"world".to_vec()));
//! store.delete(b"hello")?;
//! store.merge()?;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod entry;
pub mod segment;
pub mod keydir;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CaskError, Result};
pub use config::Config;
pub use store::{DataStore, MergeReport, RecoveryReport};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of caskdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
