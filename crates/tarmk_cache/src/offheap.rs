//! Off-heap tier: serialized values in an anonymous memory map.
//!
//! The mapped region is split into equal blocks filled one after another.
//! When the current block cannot take an entry, the next block in ring
//! order is recycled: every entry stored in it is dropped at once (FIFO by
//! block). Lookups take the lock with `try_read` and count a contended
//! lookup as a miss; puts take it with `try_write` and refuse when busy.
//! Neither path ever waits.

use crate::cache::DocumentCache;
use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::key::CacheKey;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use memmap2::MmapMut;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    block: usize,
    offset: usize,
    len: usize,
}

#[derive(Debug, Default)]
struct Block {
    used: usize,
    entries: Vec<(CacheKey, usize)>,
}

struct Region {
    map: MmapMut,
    blocks: Vec<Block>,
    block_size: usize,
    current: usize,
    index: HashMap<String, (CacheKey, Slot)>,
}

impl Region {
    fn bytes(&self, slot: Slot) -> &[u8] {
        let start = slot.block * self.block_size + slot.offset;
        &self.map[start..start + slot.len]
    }

    /// Empties the next block and makes it current. Returns the number of
    /// live entries dropped.
    fn recycle_next(&mut self) -> u64 {
        self.current = (self.current + 1) % self.blocks.len();
        let number = self.current;
        let block = std::mem::take(&mut self.blocks[number]);

        let mut dropped = 0;
        for (key, offset) in block.entries {
            let live = self
                .index
                .get(&key.id)
                .is_some_and(|(k, slot)| *k == key && slot.block == number && slot.offset == offset);
            if live {
                self.index.remove(&key.id);
                dropped += 1;
            }
        }
        debug!(block = number, dropped, "off-heap block recycled");
        dropped
    }

    fn append(&mut self, key: CacheKey, bytes: &[u8]) -> u64 {
        let mut evicted = 0;
        if self.blocks[self.current].used + bytes.len() > self.block_size {
            evicted = self.recycle_next();
        }

        let block = &mut self.blocks[self.current];
        let slot = Slot {
            block: self.current,
            offset: block.used,
            len: bytes.len(),
        };
        block.used += bytes.len();
        block.entries.push((key.clone(), slot.offset));

        let start = slot.block * self.block_size + slot.offset;
        self.map[start..start + slot.len].copy_from_slice(bytes);
        self.index.insert(key.id.clone(), (key, slot));
        evicted
    }
}

/// Cache of serialized values held outside the Rust heap.
pub struct OffHeapCache<V> {
    region: RwLock<Region>,
    stats: CacheStats,
    _values: PhantomData<fn() -> V>,
}

impl<V> OffHeapCache<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Maps `config.off_heap_bytes` of anonymous memory split into
    /// `config.off_heap_blocks` blocks.
    ///
    /// # Errors
    ///
    /// Returns `Map` if the region cannot be mapped.
    pub fn new(config: &CacheConfig) -> CacheResult<Self> {
        let blocks = config.off_heap_blocks.max(1);
        let block_size = config.block_size().max(1);
        let map = MmapMut::map_anon(blocks * block_size)?;
        debug!(blocks, block_size, "off-heap region mapped");

        Ok(Self {
            region: RwLock::new(Region {
                map,
                blocks: (0..blocks).map(|_| Block::default()).collect(),
                block_size,
                current: 0,
                index: HashMap::new(),
            }),
            stats: CacheStats::new(),
            _values: PhantomData,
        })
    }

    /// Returns the largest serialized entry a put accepts.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.region.read().block_size
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.region.read().index.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached version of `id` together with its key.
    pub(crate) fn entry_by_id(&self, id: &str) -> Option<(CacheKey, V)> {
        self.lookup(id, None)
    }

    fn lookup(&self, id: &str, key: Option<&CacheKey>) -> Option<(CacheKey, V)> {
        let Some(region) = self.region.try_read() else {
            trace!(id, "off-heap lookup contended");
            self.stats.record_miss();
            return None;
        };
        let found = region
            .index
            .get(id)
            .filter(|(stored, _)| key.map_or(true, |k| k == stored))
            .and_then(|(stored, slot)| {
                let value = bincode::deserialize(region.bytes(*slot)).ok()?;
                Some((stored.clone(), value))
            });
        drop(region);

        if found.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        found
    }
}

impl<V> DocumentCache<V> for OffHeapCache<V>
where
    V: Serialize + DeserializeOwned,
{
    fn get_if_present(&self, key: &CacheKey) -> Option<V> {
        self.lookup(&key.id, Some(key)).map(|(_, value)| value)
    }

    fn get_by_id(&self, id: &str) -> Option<V> {
        self.lookup(id, None).map(|(_, value)| value)
    }

    fn put(&self, key: CacheKey, value: V) -> bool {
        let bytes = match bincode::serialize(&value) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(id = %key.id, error = %e, "off-heap value not serializable");
                self.stats.record_rejected();
                return false;
            }
        };

        let Some(mut region) = self.region.try_write() else {
            trace!(id = %key.id, "off-heap put contended");
            self.stats.record_rejected();
            return false;
        };
        if bytes.len() > region.block_size {
            drop(region);
            self.stats.record_rejected();
            return false;
        }
        let evicted = region.append(key, &bytes);
        drop(region);

        self.stats.record_put();
        self.stats.record_evictions(evicted);
        true
    }

    fn invalidate(&self, id: &str) -> bool {
        // Blocking: invalidation must not be lost.
        self.region.write().index.remove(id).is_some()
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

impl<V> std::fmt::Debug for OffHeapCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let region = self.region.read();
        f.debug_struct("OffHeapCache")
            .field("blocks", &region.blocks.len())
            .field("block_size", &region.block_size)
            .field("entries", &region.index.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        path: String,
        body: Vec<u8>,
    }

    fn doc(path: &str, size: usize) -> Doc {
        Doc {
            path: path.to_string(),
            body: vec![7; size],
        }
    }

    fn cache(bytes: usize, blocks: usize) -> OffHeapCache<Doc> {
        OffHeapCache::new(
            &CacheConfig::new()
                .off_heap_bytes(bytes)
                .off_heap_blocks(blocks),
        )
        .unwrap()
    }

    #[test]
    fn put_and_get() {
        let cache = cache(4096, 4);
        let key = CacheKey::for_version("/a", b"1");
        assert!(cache.put(key.clone(), doc("/a", 10)));
        assert_eq!(cache.get_if_present(&key), Some(doc("/a", 10)));
        assert_eq!(cache.get_by_id("/a"), Some(doc("/a", 10)));
        assert_eq!(
            cache.get_if_present(&CacheKey::for_version("/a", b"2")),
            None
        );
        assert_eq!(cache.stats().hits, 2);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let cache = cache(4096, 4);
        assert!(!cache.put(CacheKey::for_version("/big", b"1"), doc("/big", 2000)));
        assert_eq!(cache.stats().rejected, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn full_block_evicts_oldest_block() {
        let cache = cache(2048, 2);
        // each entry is a little over 300 bytes; three fit a block
        for i in 0..6 {
            let path = format!("/n{i}");
            assert!(cache.put(CacheKey::for_version(path.as_str(), b"1"), doc(&path, 300)));
        }
        assert_eq!(cache.stats().evictions, 0);

        // the next entry recycles block 0, dropping the first three entries
        assert!(cache.put(CacheKey::for_version("/n6", b"1"), doc("/n6", 300)));
        assert_eq!(cache.stats().evictions, 3);
        for i in 0..3 {
            assert!(cache.get_by_id(&format!("/n{i}")).is_none());
        }
        for i in 3..7 {
            assert!(cache.get_by_id(&format!("/n{i}")).is_some());
        }
    }

    #[test]
    fn replaced_entry_is_not_counted_twice() {
        let cache = cache(2048, 2);
        let key = CacheKey::for_version("/a", b"1");
        cache.put(key.clone(), doc("/a", 300));
        cache.put(CacheKey::for_version("/a", b"2"), doc("/a", 301));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_if_present(&key), None);
        assert_eq!(cache.get_by_id("/a"), Some(doc("/a", 301)));
    }

    #[test]
    fn contended_access_does_not_block() {
        let cache = cache(4096, 4);
        let key = CacheKey::for_version("/a", b"1");
        cache.put(key.clone(), doc("/a", 10));

        let guard = cache.region.write();
        assert_eq!(cache.get_if_present(&key), None);
        assert!(!cache.put(CacheKey::for_version("/b", b"1"), doc("/b", 10)));
        drop(guard);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(cache.get_if_present(&key), Some(doc("/a", 10)));
    }

    #[test]
    fn invalidate_removes() {
        let cache = cache(4096, 4);
        cache.put(CacheKey::for_version("/a", b"1"), doc("/a", 10));
        assert!(cache.invalidate("/a"));
        assert!(cache.get_by_id("/a").is_none());
        assert!(!cache.invalidate("/a"));
    }
}
