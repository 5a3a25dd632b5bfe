//! Tests for the segment store
//!
//! These tests verify:
//! - Segment discovery and id allocation
//! - Appends, value offsets and rotation
//! - Random-offset reads and their error cases
//! - Compaction support: sealing, reserved ids and safe retirement

use std::collections::BTreeSet;
use std::fs::{self, File};

use caskkv::record::{encode, FRAME_OVERHEAD};
use caskkv::segment::SegmentStore;
use caskkv::CaskError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store(max_segment_size: u64) -> (TempDir, SegmentStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = SegmentStore::open(temp_dir.path(), max_segment_size).unwrap();
    (temp_dir, store)
}

fn setup_active_store(max_segment_size: u64) -> (TempDir, SegmentStore) {
    let (temp_dir, store) = setup_store(max_segment_size);
    store.create_active().unwrap();
    (temp_dir, store)
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_empty_directory() {
    let (_temp, store) = setup_store(1024);

    assert_eq!(store.segment_count(), 0);
    assert_eq!(store.next_id(), 1);
    assert_eq!(store.active_id(), None);
}

#[test]
fn test_open_creates_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("nested").join("data");

    let store = SegmentStore::open(&dir, 1024).unwrap();

    assert!(dir.is_dir());
    assert_eq!(store.dir(), dir.as_path());
    assert_eq!(store.max_segment_size(), 1024);
}

#[test]
fn test_open_discovers_existing_segments() {
    let temp_dir = TempDir::new().unwrap();
    File::create(SegmentStore::segment_path_with_dir(temp_dir.path(), 3)).unwrap();
    File::create(SegmentStore::segment_path_with_dir(temp_dir.path(), 7)).unwrap();

    let store = SegmentStore::open(temp_dir.path(), 1024).unwrap();

    assert_eq!(store.segment_ids(), vec![3, 7]);
    assert_eq!(store.next_id(), 8);
}

#[test]
fn test_open_ignores_foreign_files() {
    let temp_dir = TempDir::new().unwrap();
    File::create(temp_dir.path().join("notes.txt")).unwrap();
    File::create(temp_dir.path().join("segment_abc.data")).unwrap();
    File::create(temp_dir.path().join("segment_000002.tmp")).unwrap();
    fs::create_dir(temp_dir.path().join("segment_000009.data")).unwrap();

    let store = SegmentStore::open(temp_dir.path(), 1024).unwrap();

    assert_eq!(store.segment_count(), 0);
    assert_eq!(store.next_id(), 1);
}

#[test]
fn test_segment_file_naming() {
    let temp_dir = TempDir::new().unwrap();
    let path = SegmentStore::segment_path_with_dir(temp_dir.path(), 42);

    assert_eq!(path.file_name().unwrap(), "segment_000042.data");
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_create_active() {
    let (temp, store) = setup_store(1024);

    let id = store.create_active().unwrap();

    assert_eq!(id, 1);
    assert_eq!(store.active_id(), Some(1));
    assert!(SegmentStore::segment_path_with_dir(temp.path(), 1).exists());
}

#[test]
fn test_append_requires_active_segment() {
    let (_temp, store) = setup_store(1024);

    let result = store.append(&encode(1, b"k", b"v"));

    assert!(matches!(result, Err(CaskError::Storage(_))));
}

#[test]
fn test_append_returns_value_offsets() {
    let (_temp, store) = setup_active_store(1024);

    let first = store.append(&encode(1, b"key1", b"value1")).unwrap();
    let second = store.append(&encode(2, b"k2", b"v2")).unwrap();

    assert_eq!(first.segment_id, 1);
    assert_eq!(first.value_offset, FRAME_OVERHEAD + 4);
    assert_eq!(first.frame_len, FRAME_OVERHEAD + 10);
    assert!(first.rotated.is_none());

    assert_eq!(second.value_offset, first.frame_len + FRAME_OVERHEAD + 2);
    assert_eq!(store.size_of(1).unwrap(), first.frame_len + second.frame_len);
}

#[test]
fn test_append_then_read_at() {
    let (_temp, store) = setup_active_store(1024);

    let outcome = store.append(&encode(1, b"name", b"caskkv")).unwrap();
    let value = store.read_at(outcome.segment_id, outcome.value_offset, 6).unwrap();

    assert_eq!(value, b"caskkv");
}

#[test]
fn test_append_rotates_when_full() {
    // Each frame is 28 + 1 + 31 = 60 bytes; two fit under 150.
    let (_temp, store) = setup_active_store(150);
    let value = [b'x'; 31];

    let a = store.append(&encode(1, b"a", &value)).unwrap();
    let b = store.append(&encode(2, b"b", &value)).unwrap();
    let c = store.append(&encode(3, b"c", &value)).unwrap();

    assert_eq!(a.segment_id, 1);
    assert_eq!(b.segment_id, 1);
    assert_eq!(c.segment_id, 2);
    assert_eq!(c.rotated, Some((1, 2)));
    assert_eq!(c.value_offset, FRAME_OVERHEAD + 1);
    assert_eq!(store.active_id(), Some(2));
    assert_eq!(store.segment_ids(), vec![1, 2]);
}

#[test]
fn test_oversized_record_goes_into_empty_segment() {
    let (_temp, store) = setup_active_store(64);
    let big = vec![7u8; 500];

    let first = store.append(&encode(1, b"big", &big)).unwrap();
    let second = store.append(&encode(2, b"small", b"v")).unwrap();

    assert_eq!(first.segment_id, 1);
    assert!(first.rotated.is_none());
    assert_eq!(second.segment_id, 2);
    assert_eq!(store.read_at(1, first.value_offset, 500).unwrap(), big);
}

#[test]
fn test_segments_never_exceed_max_size() {
    let max = 1_000;
    let (temp, store) = setup_active_store(max);

    for i in 0..100u64 {
        let key = format!("key{}", i);
        let value = vec![b'v'; (i % 40) as usize];
        store.append(&encode(i, key.as_bytes(), &value)).unwrap();
    }

    assert!(store.segment_count() > 1);
    for id in store.segment_ids() {
        let path = SegmentStore::segment_path_with_dir(temp.path(), id);
        assert!(fs::metadata(path).unwrap().len() <= max);
    }
}

#[test]
fn test_explicit_rotate() {
    let (_temp, store) = setup_active_store(1024);
    store.append(&encode(1, b"k", b"v")).unwrap();

    let (sealed, active) = store.rotate().unwrap();

    assert_eq!(sealed, 1);
    assert_eq!(active, 2);
    assert_eq!(store.active_id(), Some(2));
    assert_eq!(store.size_of(2).unwrap(), 0);
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_read_unknown_segment() {
    let (_temp, store) = setup_active_store(1024);

    let err = store.read_at(99, 0, 4).unwrap_err();

    assert!(matches!(err, CaskError::SegmentNotFound(99)));
    assert!(err.is_not_found());
}

#[test]
fn test_read_past_end_is_truncated() {
    let (_temp, store) = setup_active_store(1024);
    let outcome = store.append(&encode(1, b"k", b"value")).unwrap();

    let err = store
        .read_at(outcome.segment_id, outcome.value_offset, 100)
        .unwrap_err();

    match err {
        CaskError::Truncated {
            segment_id,
            requested,
            available,
            ..
        } => {
            assert_eq!(segment_id, 1);
            assert_eq!(requested, 100);
            assert_eq!(available, 5);
        }
        other => panic!("expected Truncated, got {:?}", other),
    }
}

#[test]
fn test_read_through_pin() {
    let (_temp, store) = setup_active_store(1024);
    let outcome = store.append(&encode(1, b"k", b"pinned")).unwrap();

    let pinned = store.pin();
    let value = pinned.read_at(outcome.segment_id, outcome.value_offset, 6).unwrap();

    assert_eq!(value, b"pinned");
}

#[test]
fn test_scan_segment_through_store() {
    let (_temp, store) = setup_active_store(1024);
    store.append(&encode(1, b"a", b"1")).unwrap();
    store.append(&encode(2, b"b", b"2")).unwrap();

    let keys: Vec<_> = store
        .scan(1)
        .unwrap()
        .map(|r| r.unwrap().key)
        .collect();

    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    assert!(store.scan(5).is_err());
}

#[test]
fn test_total_size() {
    let (_temp, store) = setup_active_store(100);
    let a = store.append(&encode(1, b"a", &[0u8; 50])).unwrap();
    let b = store.append(&encode(2, b"b", &[0u8; 50])).unwrap();

    assert_eq!(store.segment_count(), 2);
    assert_eq!(store.total_size().unwrap(), a.frame_len + b.frame_len);
}

// =============================================================================
// Compaction Support Tests
// =============================================================================

#[test]
fn test_seal_for_compaction_reserves_ids_below_active() {
    let (_temp, store) = setup_active_store(100);
    store.append(&encode(1, b"a", &[0u8; 50])).unwrap();
    store.append(&encode(2, b"b", &[0u8; 50])).unwrap();
    assert_eq!(store.segment_ids(), vec![1, 2]);

    let sealed = store.seal_for_compaction().unwrap();

    // Both existing segments (the previous active included) are inputs,
    // each holding one partly filled segment's worth: two ids apiece.
    assert_eq!(sealed.inputs, vec![1, 2]);
    assert_eq!(sealed.reserved, 3..7);
    assert_eq!(sealed.active_id, 7);
    assert_eq!(store.active_id(), Some(7));
    assert_eq!(store.next_id(), 8);
}

#[test]
fn test_seal_for_compaction_reserves_for_oversized_segments() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = SegmentStore::open(temp_dir.path(), 1024).unwrap();
        store.create_active().unwrap();
        for ts in 0..5 {
            store.append(&encode(ts, b"a", &[0u8; 50])).unwrap();
        }
        assert_eq!(store.size_of(1).unwrap(), 5 * 79);
    }

    // Reopened with a limit the old segment is far larger than
    let store = SegmentStore::open(temp_dir.path(), 100).unwrap();
    store.create_active().unwrap();
    let sealed = store.seal_for_compaction().unwrap();

    // 395 bytes at 100 per segment: 2 * 4 ids, plus one for the empty active
    assert_eq!(sealed.inputs, vec![1, 2]);
    assert_eq!(sealed.reserved, 3..12);
    assert_eq!(sealed.active_id, 12);
}

#[test]
fn test_create_output_registers_segment() {
    let (_temp, store) = setup_active_store(1024);
    let sealed = store.seal_for_compaction().unwrap();
    let output_id = sealed.reserved.start;

    let mut writer = store.create_output(output_id).unwrap();
    let offset = writer.append(&encode(1, b"k", b"moved")).unwrap();

    assert!(store.segment_ids().contains(&output_id));
    let value = store
        .read_at(output_id, offset + FRAME_OVERHEAD + 1, 5)
        .unwrap();
    assert_eq!(value, b"moved");
}

#[test]
fn test_retire_keeps_referenced_and_active_segments() {
    let (_temp, store) = setup_active_store(40);
    store.append(&encode(1, b"a", b"1")).unwrap();
    store.append(&encode(2, b"b", b"2")).unwrap();
    store.append(&encode(3, b"c", b"3")).unwrap();
    assert_eq!(store.segment_ids(), vec![1, 2, 3]);
    let freed_expected = store.size_of(1).unwrap();

    let outcome = store
        .retire(&[1, 2, 3], || BTreeSet::from([2]))
        .unwrap();

    assert_eq!(outcome.deleted, vec![1]);
    assert_eq!(outcome.kept, vec![2, 3]);
    assert_eq!(outcome.bytes_freed, freed_expected);
    assert_eq!(store.segment_ids(), vec![2, 3]);
    assert!(matches!(store.read_at(1, 0, 1), Err(CaskError::SegmentNotFound(1))));
}

#[test]
fn test_retire_accounts_for_partial_failure() {
    let (temp, store) = setup_active_store(40);
    store.append(&encode(1, b"a", b"1")).unwrap();
    store.append(&encode(2, b"b", b"2")).unwrap();
    store.append(&encode(3, b"c", b"3")).unwrap();
    let freed_expected = store.size_of(1).unwrap();

    // A directory in place of segment 2 cannot be removed as a file
    let blocked = SegmentStore::segment_path_with_dir(temp.path(), 2);
    fs::remove_file(&blocked).unwrap();
    fs::create_dir(&blocked).unwrap();

    let outcome = store.retire(&[1, 2], BTreeSet::new).unwrap();

    assert_eq!(outcome.deleted, vec![1]);
    assert_eq!(outcome.failed, vec![2]);
    assert!(outcome.kept.is_empty());
    assert_eq!(outcome.bytes_freed, freed_expected);
    assert_eq!(store.segment_ids(), vec![2, 3]);
}

#[test]
fn test_delete_refuses_active_segment() {
    let (_temp, store) = setup_active_store(1024);

    assert!(store.delete(1).is_err());
    assert_eq!(store.segment_ids(), vec![1]);
}

#[test]
fn test_delete_sealed_segment() {
    let (temp, store) = setup_active_store(1024);
    store.append(&encode(1, b"k", b"v")).unwrap();
    store.rotate().unwrap();

    let freed = store.delete(1).unwrap();

    assert_eq!(freed, FRAME_OVERHEAD + 2);
    assert!(!SegmentStore::segment_path_with_dir(temp.path(), 1).exists());
    assert_eq!(store.segment_ids(), vec![2]);
}

#[test]
fn test_prune_empty_segments() {
    let temp_dir = TempDir::new().unwrap();
    File::create(SegmentStore::segment_path_with_dir(temp_dir.path(), 1)).unwrap();
    File::create(SegmentStore::segment_path_with_dir(temp_dir.path(), 2)).unwrap();

    {
        let store = SegmentStore::open(temp_dir.path(), 1024).unwrap();
        store.create_active().unwrap();
        store.append(&encode(1, b"k", b"v")).unwrap();
    }

    let store = SegmentStore::open(temp_dir.path(), 1024).unwrap();
    let pruned = store.prune_empty().unwrap();

    assert_eq!(pruned, 2);
    assert_eq!(store.segment_ids(), vec![3]);
    // Ids are never reused, even after pruning.
    assert_eq!(store.next_id(), 4);
}
