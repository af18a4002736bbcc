//! In-heap LRU tier.

use crate::cache::DocumentCache;
use crate::key::CacheKey;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// Bounded least-recently-used cache of values in ordinary memory.
#[derive(Debug)]
pub struct HeapCache<V> {
    state: Mutex<LruState<V>>,
    capacity: usize,
    stats: CacheStats,
}

#[derive(Debug)]
struct LruState<V> {
    entries: HashMap<String, LruEntry<V>>,
    // last-use tick → id, oldest first
    order: BTreeMap<u64, String>,
    tick: u64,
}

#[derive(Debug)]
struct LruEntry<V> {
    key: CacheKey,
    value: V,
    tick: u64,
}

impl<V> LruState<V> {
    fn touch(&mut self, id: &str) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(id) {
            self.order.remove(&entry.tick);
            entry.tick = tick;
            self.order.insert(tick, id.to_string());
        }
    }

    fn remove(&mut self, id: &str) -> Option<LruEntry<V>> {
        let entry = self.entries.remove(id)?;
        self.order.remove(&entry.tick);
        Some(entry)
    }

    fn pop_oldest(&mut self) -> Option<LruEntry<V>> {
        let (_, id) = self.order.pop_first()?;
        self.entries.remove(&id)
    }
}

impl<V: Clone> HeapCache<V> {
    /// Creates a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                tick: 0,
            }),
            capacity: capacity.max(1),
            stats: CacheStats::new(),
        }
    }

    /// Returns the entry capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `value` and returns the entries evicted to make room.
    pub fn put_evicting(&self, key: CacheKey, value: V) -> Vec<(CacheKey, V)> {
        let mut state = self.state.lock();
        state.remove(&key.id);
        state.tick += 1;
        let tick = state.tick;
        state.order.insert(tick, key.id.clone());
        state
            .entries
            .insert(key.id.clone(), LruEntry { key, value, tick });

        let mut evicted = Vec::new();
        while state.entries.len() > self.capacity {
            match state.pop_oldest() {
                Some(entry) => evicted.push((entry.key, entry.value)),
                None => break,
            }
        }
        drop(state);

        self.stats.record_put();
        self.stats.record_evictions(evicted.len() as u64);
        evicted
    }
}

impl<V: Clone + Send> DocumentCache<V> for HeapCache<V> {
    fn get_if_present(&self, key: &CacheKey) -> Option<V> {
        let mut state = self.state.lock();
        let found = state
            .entries
            .get(&key.id)
            .filter(|entry| entry.key == *key)
            .map(|entry| entry.value.clone());
        if found.is_some() {
            state.touch(&key.id);
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        found
    }

    fn get_by_id(&self, id: &str) -> Option<V> {
        let mut state = self.state.lock();
        let found = state.entries.get(id).map(|entry| entry.value.clone());
        if found.is_some() {
            state.touch(id);
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        found
    }

    fn put(&self, key: CacheKey, value: V) -> bool {
        self.put_evicting(key, value);
        true
    }

    fn invalidate(&self, id: &str) -> bool {
        self.state.lock().remove(id).is_some()
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}
