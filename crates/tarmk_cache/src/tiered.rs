//! Heap tier in front of an off-heap tier.

use crate::cache::DocumentCache;
use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::heap::HeapCache;
use crate::key::CacheKey;
use crate::offheap::OffHeapCache;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Two tiers behind one [`DocumentCache`].
///
/// - lookups try the heap tier, then the off-heap tier
/// - an off-heap hit is promoted into the heap tier
/// - entries the heap tier evicts are demoted into the off-heap tier
///
/// The combined counters count one hit or miss per lookup; each tier keeps
/// its own counters as well.
#[derive(Debug)]
pub struct TieredCache<V> {
    heap: HeapCache<V>,
    off_heap: OffHeapCache<V>,
    stats: CacheStats,
}

impl<V> TieredCache<V>
where
    V: Clone + Send + Serialize + DeserializeOwned,
{
    /// Creates both tiers.
    ///
    /// # Errors
    ///
    /// Returns `Map` if the off-heap region cannot be mapped.
    pub fn new(config: &CacheConfig) -> CacheResult<Self> {
        Ok(Self {
            heap: HeapCache::new(config.heap_capacity),
            off_heap: OffHeapCache::new(config)?,
            stats: CacheStats::new(),
        })
    }

    /// Returns the heap tier.
    #[must_use]
    pub fn heap(&self) -> &HeapCache<V> {
        &self.heap
    }

    /// Returns the off-heap tier.
    #[must_use]
    pub fn off_heap(&self) -> &OffHeapCache<V> {
        &self.off_heap
    }

    fn store_in_heap(&self, key: CacheKey, value: V) {
        for (evicted, value) in self.heap.put_evicting(key, value) {
            self.off_heap.put(evicted, value);
        }
    }

    fn promote(&self, key: CacheKey, value: &V) {
        self.store_in_heap(key, value.clone());
    }

    fn finish(&self, found: Option<V>) -> Option<V> {
        if found.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        found
    }
}

impl<V> DocumentCache<V> for TieredCache<V>
where
    V: Clone + Send + Serialize + DeserializeOwned,
{
    fn get_if_present(&self, key: &CacheKey) -> Option<V> {
        if let Some(value) = self.heap.get_if_present(key) {
            return self.finish(Some(value));
        }
        let found = self.off_heap.get_if_present(key);
        if let Some(value) = &found {
            self.promote(key.clone(), value);
        }
        self.finish(found)
    }

    fn get_by_id(&self, id: &str) -> Option<V> {
        if let Some(value) = self.heap.get_by_id(id) {
            return self.finish(Some(value));
        }
        let found = self.off_heap.entry_by_id(id).map(|(key, value)| {
            self.promote(key, &value);
            value
        });
        self.finish(found)
    }

    fn put(&self, key: CacheKey, value: V) -> bool {
        // an older version must not resurface from the lower tier
        self.off_heap.invalidate(&key.id);
        self.store_in_heap(key, value);
        self.stats.record_put();
        true
    }

    fn invalidate(&self, id: &str) -> bool {
        let heap = self.heap.invalidate(id);
        let off_heap = self.off_heap.invalidate(id);
        heap || off_heap
    }

    fn stats(&self) -> CacheStatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.evictions = self.off_heap.stats().evictions;
        snapshot.rejected = self.off_heap.stats().rejected;
        snapshot
    }
}
