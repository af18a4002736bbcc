//! Cached segment access for node states.

use crate::error::CoreResult;
use crate::segment::Segment;
use crate::store::SegmentStore;
use crate::types::SegmentId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_CACHE_SEGMENTS: usize = 256;

/// Reads segments through a store and keeps recently used ones parsed.
///
/// Segment-backed node states share one reader; the cache is a plain map
/// cleared when it reaches capacity.
pub struct SegmentReader {
    store: Arc<dyn SegmentStore>,
    cache: Mutex<HashMap<SegmentId, Arc<Segment>>>,
    capacity: usize,
}

impl SegmentReader {
    /// Creates a reader over `store`.
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self::with_capacity(store, DEFAULT_CACHE_SEGMENTS)
    }

    /// Creates a reader caching at most `capacity` segments.
    pub fn with_capacity(store: Arc<dyn SegmentStore>, capacity: usize) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }

    /// Returns segment `id`.
    ///
    /// # Errors
    ///
    /// Returns `SegmentNotFound` if the store does not hold it.
    pub fn segment(&self, id: SegmentId) -> CoreResult<Arc<Segment>> {
        if let Some(segment) = self.cache.lock().get(&id) {
            return Ok(Arc::clone(segment));
        }

        let segment = self.store.read(id)?;
        let mut cache = self.cache.lock();
        if cache.len() >= self.capacity {
            cache.clear();
        }
        cache.insert(id, Arc::clone(&segment));
        Ok(segment)
    }
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("cached", &self.cache.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
