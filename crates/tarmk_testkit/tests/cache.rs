//! Cache tiers under load.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tarmk_cache::{CacheConfig, CacheKey, DocumentCache, OffHeapCache, TieredCache};

/// Serialized size is 8 bytes of length prefix plus the payload.
fn doc(len: usize) -> Vec<u8> {
    vec![0xAB; len - 8]
}

#[test]
fn off_heap_evicts_whole_blocks_first_in_first_out() {
    // Two blocks of 1024 bytes; three 300-byte documents per block.
    let cache: OffHeapCache<Vec<u8>> =
        OffHeapCache::new(&CacheConfig::new().off_heap_bytes(2048).off_heap_blocks(2)).unwrap();
    let keys: Vec<_> = (0..7)
        .map(|i| CacheKey::for_version(format!("/doc/{i}"), b"v1"))
        .collect();

    for key in &keys[..6] {
        assert!(cache.put(key.clone(), doc(300)));
    }
    assert_eq!(cache.len(), 6);
    assert_eq!(cache.stats().evictions, 0);

    // The seventh document recycles the oldest block.
    assert!(cache.put(keys[6].clone(), doc(300)));
    let stats = cache.stats();
    assert_eq!(stats.evictions, 3);
    assert_eq!(cache.len(), 4);
    for key in &keys[..3] {
        assert!(cache.get_if_present(key).is_none());
    }
    for key in &keys[3..] {
        assert_eq!(cache.get_if_present(key), Some(doc(300)));
    }

    let stats = cache.stats();
    assert_eq!(stats.hits, 4);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.puts, 7);
}

#[test]
fn off_heap_refuses_entries_larger_than_a_block() {
    let cache: OffHeapCache<Vec<u8>> =
        OffHeapCache::new(&CacheConfig::new().off_heap_bytes(2048).off_heap_blocks(2)).unwrap();
    assert!(!cache.put(CacheKey::for_version("/big", b"v1"), doc(2000)));
    assert_eq!(cache.stats().rejected, 1);
    assert!(cache.is_empty());
}

#[test]
fn off_heap_lookups_never_wait_on_writers() {
    let cache: Arc<OffHeapCache<Vec<u8>>> = Arc::new(
        OffHeapCache::new(&CacheConfig::new().off_heap_bytes(1 << 20).off_heap_blocks(8)).unwrap(),
    );
    let key = CacheKey::for_version("/hot", b"v1");
    cache.put(key.clone(), doc(64));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..2_000 {
                    cache.put(CacheKey::for_version(format!("/w{t}/{i}"), b"v1"), doc(256));
                }
            })
        })
        .collect();

    let start = Instant::now();
    for _ in 0..10_000 {
        // A contended lookup is a miss, never a wait.
        let _ = cache.get_if_present(&key);
    }
    let elapsed = start.elapsed();
    for writer in writers {
        writer.join().unwrap();
    }

    assert!(elapsed < Duration::from_secs(10));
    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 10_000);
    assert_eq!(stats.puts + stats.rejected, 8_001);
}

#[test]
fn tiered_cache_demotes_and_promotes() {
    let cache: TieredCache<String> = TieredCache::new(
        &CacheConfig::new()
            .heap_capacity(2)
            .off_heap_bytes(1 << 16)
            .off_heap_blocks(4),
    )
    .unwrap();
    let a = CacheKey::for_version("/a", b"1");
    let b = CacheKey::for_version("/b", b"1");
    let c = CacheKey::for_version("/c", b"1");

    cache.put(a.clone(), "alpha".to_string());
    cache.put(b.clone(), "beta".to_string());
    cache.put(c.clone(), "gamma".to_string());

    // "/a" was evicted from the heap into the off-heap tier.
    assert_eq!(cache.heap().len(), 2);
    assert_eq!(cache.off_heap().len(), 1);
    assert_eq!(cache.get_if_present(&a).as_deref(), Some("alpha"));
    assert_eq!(cache.get_by_id("/c").as_deref(), Some("gamma"));

    // A new version replaces the old one in both tiers.
    let a2 = CacheKey::for_version("/a", b"2");
    cache.put(a2.clone(), "alpha2".to_string());
    assert!(cache.get_if_present(&a).is_none());
    assert_eq!(cache.get_by_id("/a").as_deref(), Some("alpha2"));

    assert!(cache.invalidate("/a"));
    assert!(cache.get_by_id("/a").is_none());

    let stats = cache.stats();
    assert!(stats.hits >= 3);
    assert!(stats.misses >= 2);
    assert!(stats.hit_ratio() > 0.0);
}
