//! Segment store contract, checked against both variants.

use proptest::prelude::*;
use std::sync::Arc;
use tarmk_core::{
    CoreError, MemoryStore, SegmentBuilder, SegmentId, SegmentStore, StoreConfig, TarStore,
};
use tarmk_testkit::PropTestConfig;
use tempfile::tempdir;

/// Builds a segment's wire form from raw records.
fn segment(
    generation: u32,
    records: &[Vec<u8>],
    references: &[SegmentId],
) -> (SegmentId, Vec<u8>, Vec<SegmentId>) {
    let mut builder = SegmentBuilder::new(generation);
    for (i, record) in records.iter().enumerate() {
        let refs = if i == 0 { references.to_vec() } else { Vec::new() };
        builder.add_record(record, refs);
    }
    let (id, data, refs) = builder.finish();
    (id, data.to_vec(), refs)
}

fn check_write_read(store: &dyn SegmentStore, generation: u32, records: &[Vec<u8>]) {
    let (base, base_data, _) = segment(0, &[b"base".to_vec()], &[]);
    store.write(base, base_data.into(), Vec::new()).unwrap();

    let (id, data, refs) = segment(generation, records, &[base]);
    store.write(id, data.clone().into(), refs.clone()).unwrap();

    let read = store.read(id).unwrap();
    assert_eq!(read.data().as_ref(), data.as_slice());
    assert_eq!(read.references(), refs.as_slice());
    assert_eq!(read.generation(), generation);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(read.record(i as u32).unwrap(), record.as_slice());
    }
}

fn check_duplicate(store: &dyn SegmentStore) {
    let (id, original, _) = segment(0, &[b"first".to_vec()], &[]);
    store.write(id, original.clone().into(), Vec::new()).unwrap();

    let mut other = SegmentBuilder::with_id(id, 0);
    other.add_record(b"second", []);
    let (_, replacement, _) = other.finish();
    assert!(matches!(
        store.write(id, replacement, Vec::new()),
        Err(CoreError::SegmentExists { id: dup }) if dup == id
    ));
    assert_eq!(store.read(id).unwrap().data().as_ref(), original.as_slice());
}

#[test]
fn memory_store_reads_back_exact_bytes() {
    let store = MemoryStore::new();
    check_write_read(&store, 3, &[b"one".to_vec(), Vec::new(), vec![7; 1000]]);
}

#[test]
fn tar_store_reads_back_exact_bytes() {
    let dir = tempdir().unwrap();
    let store = TarStore::open(dir.path(), StoreConfig::default()).unwrap();
    check_write_read(&store, 3, &[b"one".to_vec(), Vec::new(), vec![7; 1000]]);
}

#[test]
fn duplicate_write_keeps_original_bytes() {
    check_duplicate(&MemoryStore::new());

    let dir = tempdir().unwrap();
    check_duplicate(&TarStore::open(dir.path(), StoreConfig::default()).unwrap());
}

#[test]
fn missing_segment_is_not_found() {
    let dir = tempdir().unwrap();
    let stores: Vec<Arc<dyn SegmentStore>> = vec![
        Arc::new(MemoryStore::new()),
        Arc::new(TarStore::open(dir.path(), StoreConfig::default()).unwrap()),
    ];
    for store in stores {
        let id = SegmentId::new();
        assert!(matches!(store.read(id), Err(CoreError::SegmentNotFound { .. })));
        assert!(matches!(store.delete(id), Err(CoreError::SegmentNotFound { .. })));
        assert!(!store.contains(id));
    }
}

#[test]
fn journal_is_created_on_first_use() {
    let store = MemoryStore::new();
    assert!(matches!(
        store.journal_head("root"),
        Err(CoreError::JournalNotFound { .. })
    ));
    let journal = store.journal("root").unwrap();
    assert!(journal.head().is_none());
    assert_eq!(store.journal_names(), vec!["root".to_string()]);
}

proptest! {
    #![proptest_config(PropTestConfig::standard())]

    #[test]
    fn memory_store_write_read(
        generation in 0u32..100,
        records in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..200), 0..16),
    ) {
        check_write_read(&MemoryStore::new(), generation, &records);
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick())]

    #[test]
    fn tar_store_write_read(
        generation in 0u32..100,
        records in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..600), 0..8),
    ) {
        let dir = tempdir().unwrap();
        let store = TarStore::open(dir.path(), StoreConfig::default()).unwrap();
        check_write_read(&store, generation, &records);
    }
}
