//! Tests for DataStore
//!
//! These tests verify:
//! - Basic get/put/delete operations
//! - Key enumeration
//! - Segment rotation at the size threshold
//! - Reads from archived segments
//! - Persistence across close/reopen
//! - Concurrent readers

use std::fs;
use std::path::Path;
use std::thread;

use caskdb::config::Config;
use caskdb::entry::entry_size;
use caskdb::segment::segment_path;
use caskdb::store::DataStore;
use caskdb::CaskError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_store(dir: &Path, threshold: u64) -> DataStore {
    let config = Config::builder()
        .data_dir(dir)
        .segment_size_threshold(threshold)
        .build();
    DataStore::open(config).unwrap()
}

fn setup_temp_store() -> (TempDir, DataStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(temp_dir.path(), 1024 * 1024);
    (temp_dir, store)
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_empty_directory() {
    let (temp, store) = setup_temp_store();

    assert_eq!(store.active_segment_id(), 0);
    assert!(store.archived_segment_ids().is_empty());
    assert_eq!(store.segment_count(), 1);
    assert!(store.is_empty());
    assert!(segment_path(temp.path(), 0).exists());
}

#[test]
fn test_open_missing_directory_fails() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope");

    let result = DataStore::open_path(&missing);

    assert!(matches!(result, Err(CaskError::MissingDirectory(p)) if p == missing));
    assert!(!missing.exists());
}

#[test]
fn test_open_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .segment_size_threshold(0)
        .build();

    assert!(matches!(DataStore::open(config), Err(CaskError::Config(_))));
}

#[test]
fn test_open_ignores_foreign_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("README"), b"not a segment").unwrap();
    fs::write(temp_dir.path().join("cask.db.tmp"), b"not a segment").unwrap();

    let store = open_store(temp_dir.path(), 1024);

    assert_eq!(store.active_segment_id(), 0);
    assert!(store.is_empty());
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_get() {
    let (_temp, mut store) = setup_temp_store();

    store.put(b"hello", b"world").unwrap();

    assert_eq!(store.get(b"hello").unwrap(), Some(b"world".to_vec()));
}

#[test]
fn test_get_nonexistent_key() {
    let (_temp, store) = setup_temp_store();

    assert_eq!(store.get(b"nonexistent").unwrap(), None);
}

#[test]
fn test_put_overwrite() {
    let (_temp, mut store) = setup_temp_store();

    store.put(b"key", b"value1").unwrap();
    store.put(b"key", b"value2").unwrap();

    assert_eq!(store.get(b"key").unwrap(), Some(b"value2".to_vec()));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_put_empty_value() {
    let (_temp, mut store) = setup_temp_store();

    store.put(b"key", b"").unwrap();

    assert_eq!(store.get(b"key").unwrap(), Some(Vec::new()));
    assert!(store.contains_key(b"key"));
}

#[test]
fn test_empty_key_rejected() {
    let (_temp, mut store) = setup_temp_store();

    assert!(matches!(store.put(b"", b"v"), Err(CaskError::EmptyKey)));
    assert!(matches!(store.delete(b""), Err(CaskError::EmptyKey)));
    assert_eq!(store.disk_size(), 0);
}

#[test]
fn test_delete() {
    let (_temp, mut store) = setup_temp_store();

    store.put(b"key", b"value").unwrap();
    store.delete(b"key").unwrap();

    assert_eq!(store.get(b"key").unwrap(), None);
    assert!(!store.contains_key(b"key"));
}

#[test]
fn test_delete_nonexistent_key_still_writes_tombstone() {
    let (_temp, mut store) = setup_temp_store();

    store.delete(b"nonexistent").unwrap();

    assert_eq!(store.get(b"nonexistent").unwrap(), None);
    assert_eq!(store.disk_size(), entry_size(11, 0));
}

#[test]
fn test_put_after_delete() {
    let (_temp, mut store) = setup_temp_store();

    store.put(b"key", b"one").unwrap();
    store.delete(b"key").unwrap();
    store.put(b"key", b"two").unwrap();

    assert_eq!(store.get(b"key").unwrap(), Some(b"two".to_vec()));
}

#[test]
fn test_hello_world_scenario() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut store = open_store(temp_dir.path(), 1024);

        store.put(b"hello", b"world").unwrap();
        assert_eq!(store.disk_size(), 27);
        assert_eq!(store.get(b"hello").unwrap(), Some(b"world".to_vec()));

        store.delete(b"hello").unwrap();
        assert_eq!(store.get(b"hello").unwrap(), None);

        store.close().unwrap();
    }

    let store = open_store(temp_dir.path(), 1024);
    assert_eq!(store.get(b"hello").unwrap(), None);
    assert!(store.is_empty());
}

#[test]
fn test_keys() {
    let (_temp, mut store) = setup_temp_store();

    store.put(b"a", b"1").unwrap();
    store.put(b"b", b"2").unwrap();
    store.put(b"c", b"3").unwrap();
    store.delete(b"b").unwrap();

    let mut keys: Vec<Vec<u8>> = store.keys().map(|k| k.to_vec()).collect();
    keys.sort();

    assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_rotation_boundary() {
    let temp_dir = TempDir::new().unwrap();
    // "k1"/"v1" records are 21 bytes: two fit exactly into 42
    let mut store = open_store(temp_dir.path(), 42);

    store.put(b"k1", b"v1").unwrap();
    store.put(b"k2", b"v2").unwrap();
    assert_eq!(store.active_segment_id(), 0);
    assert_eq!(store.disk_size(), 42);

    store.put(b"k3", b"v3").unwrap();
    assert_eq!(store.active_segment_id(), 1);
    assert_eq!(store.archived_segment_ids(), vec![0]);
    assert_eq!(fs::metadata(segment_path(temp_dir.path(), 0)).unwrap().len(), 42);
    assert_eq!(fs::metadata(segment_path(temp_dir.path(), 1)).unwrap().len(), 21);
}

#[test]
fn test_rotation_retries_after_failed_segment_create() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path(), 42);
    store.put(b"k1", b"v1").unwrap();
    store.put(b"k2", b"v2").unwrap();

    // a directory squatting on the next segment's name makes the open fail
    let blocker = segment_path(temp_dir.path(), 1);
    fs::create_dir(&blocker).unwrap();
    assert!(matches!(store.put(b"k3", b"v3"), Err(CaskError::Io(_))));
    assert_eq!(store.active_segment_id(), 0);
    assert_eq!(store.get(b"k3").unwrap(), None);
    assert_eq!(fs::metadata(segment_path(temp_dir.path(), 0)).unwrap().len(), 42);

    // segment 0 stays sealed; the next append rotates past it
    fs::remove_dir(&blocker).unwrap();
    store.put(b"k", b"").unwrap();

    assert_eq!(store.active_segment_id(), 1);
    assert_eq!(store.archived_segment_ids(), vec![0]);
    assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(store.get(b"k").unwrap(), Some(Vec::new()));
}

#[test]
fn test_tombstones_rotate_too() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path(), 42);

    store.put(b"k1", b"v1").unwrap();
    store.put(b"k2", b"v2").unwrap();
    store.delete(b"k1").unwrap();

    assert_eq!(store.active_segment_id(), 1);
    assert_eq!(store.get(b"k1").unwrap(), None);
    assert_eq!(store.get(b"k2").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_oversized_record_gets_own_segment() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path(), 32);
    let big = vec![7u8; 100];

    store.put(b"big", &big).unwrap();
    assert_eq!(store.active_segment_id(), 0);

    store.put(b"small", b"x").unwrap();
    assert_eq!(store.active_segment_id(), 1);

    assert_eq!(store.get(b"big").unwrap(), Some(big));
    assert_eq!(store.get(b"small").unwrap(), Some(b"x".to_vec()));
}

#[test]
fn test_reads_span_archived_segments() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path(), 64);

    for i in 0..50 {
        store
            .put(format!("key{:02}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }

    assert!(store.archived_segment_ids().len() > 10);
    for i in 0..50 {
        assert_eq!(
            store.get(format!("key{:02}", i).as_bytes()).unwrap(),
            Some(format!("value{}", i).into_bytes())
        );
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_restores_everything() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut store = open_store(temp_dir.path(), 100);
        for i in 0..30 {
            store.put(format!("k{}", i).as_bytes(), b"first").unwrap();
        }
        for i in 0..30 {
            if i % 3 == 0 {
                store.delete(format!("k{}", i).as_bytes()).unwrap();
            } else if i % 3 == 1 {
                store.put(format!("k{}", i).as_bytes(), b"second").unwrap();
            }
        }
        store.close().unwrap();
    }

    let store = open_store(temp_dir.path(), 100);

    assert_eq!(store.len(), 20);
    for i in 0..30 {
        let expected = match i % 3 {
            0 => None,
            1 => Some(b"second".to_vec()),
            _ => Some(b"first".to_vec()),
        };
        assert_eq!(store.get(format!("k{}", i).as_bytes()).unwrap(), expected);
    }
}

#[test]
fn test_reopen_continues_highest_segment() {
    let temp_dir = TempDir::new().unwrap();
    let active = {
        let mut store = open_store(temp_dir.path(), 42);
        for i in 0..5 {
            store.put(format!("k{}", i).as_bytes(), b"v1").unwrap();
        }
        store.active_segment_id()
    };

    let mut store = open_store(temp_dir.path(), 42);
    assert_eq!(store.active_segment_id(), active);
    assert_eq!(store.recovery_report().segments_loaded, active as usize + 1);
    assert_eq!(store.recovery_report().records_replayed, 5);

    store.put(b"k9", b"v9").unwrap();
    assert_eq!(store.get(b"k9").unwrap(), Some(b"v9".to_vec()));
}

#[test]
fn test_delete_in_later_segment_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut store = open_store(temp_dir.path(), 42);
        store.put(b"k1", b"v1").unwrap();
        store.put(b"k2", b"v2").unwrap();
        // rotates: the tombstone lands in segment 1, the value lives in 0
        store.delete(b"k1").unwrap();
        assert_eq!(store.active_segment_id(), 1);
    }

    let store = open_store(temp_dir.path(), 42);
    assert_eq!(store.get(b"k1").unwrap(), None);
    assert_eq!(store.get(b"k2").unwrap(), Some(b"v2".to_vec()));
    assert_eq!(store.recovery_report().tombstones_replayed, 1);
}

// =============================================================================
// Integrity Tests
// =============================================================================

#[test]
fn test_get_detects_corrupt_record() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path(), 1024);
    store.put(b"key", b"value").unwrap();

    let path = segment_path(temp_dir.path(), 0);
    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xFF;
    fs::write(&path, &data).unwrap();

    assert!(matches!(
        store.get(b"key"),
        Err(CaskError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_get_on_truncated_segment_is_short_read() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path(), 1024);
    store.put(b"key", b"value").unwrap();

    let path = segment_path(temp_dir.path(), 0);
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(10).unwrap();
    drop(file);

    assert!(matches!(
        store.get(b"key"),
        Err(CaskError::ShortRead { segment_id: 0, .. })
    ));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_readers() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path(), 256);
    for i in 0..100 {
        store
            .put(format!("key{}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }

    let store = &store;
    thread::scope(|s| {
        for t in 0..4 {
            s.spawn(move || {
                for i in (t..100).step_by(4) {
                    let value = store.get(format!("key{}", i).as_bytes()).unwrap();
                    assert_eq!(value, Some(format!("value{}", i).into_bytes()));
                }
            });
        }
    });
}
