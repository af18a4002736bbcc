//! In-memory segment store.

use crate::error::{CoreError, CoreResult};
use crate::segment::Segment;
use crate::stats::{StatsSnapshot, StoreStats};
use crate::store::{Journal, ReclaimReport, SegmentStore};
use crate::types::{Generation, SegmentId};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Segment store backed by a lock-guarded map.
///
/// Nothing survives the process. Useful for tests and for ephemeral
/// repositories; behaves exactly like [`TarStore`](crate::TarStore)
/// otherwise.
#[derive(Debug, Default)]
pub struct MemoryStore {
    segments: RwLock<HashMap<SegmentId, Arc<Segment>>>,
    journals: Mutex<HashMap<String, Arc<Journal>>>,
    stats: Arc<StoreStats>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }
}

impl SegmentStore for MemoryStore {
    fn write(&self, id: SegmentId, data: Bytes, references: Vec<SegmentId>) -> CoreResult<()> {
        let segment = Segment::parse(id, data, references)?;
        let len = segment.data().len() as u64;

        let mut segments = self.segments.write();
        if segments.contains_key(&id) {
            return Err(CoreError::SegmentExists { id });
        }
        if let Some(missing) = segment
            .references()
            .iter()
            .find(|r| !segments.contains_key(r))
        {
            return Err(CoreError::SegmentNotFound { id: *missing });
        }
        segments.insert(id, Arc::new(segment));
        drop(segments);

        self.stats.record_write(len);
        Ok(())
    }

    fn read(&self, id: SegmentId) -> CoreResult<Arc<Segment>> {
        let segment = self
            .segments
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::SegmentNotFound { id })?;
        self.stats.record_read(segment.data().len() as u64);
        Ok(segment)
    }

    fn delete(&self, id: SegmentId) -> CoreResult<()> {
        self.segments
            .write()
            .remove(&id)
            .ok_or(CoreError::SegmentNotFound { id })?;
        self.stats.record_delete(1);
        Ok(())
    }

    fn contains(&self, id: SegmentId) -> bool {
        self.segments.read().contains_key(&id)
    }

    fn segment_ids(&self) -> Vec<SegmentId> {
        self.segments.read().keys().copied().collect()
    }

    fn generation(&self, id: SegmentId) -> CoreResult<Generation> {
        self.segments
            .read()
            .get(&id)
            .map(|s| s.generation())
            .ok_or(CoreError::SegmentNotFound { id })
    }

    fn references(&self, id: SegmentId) -> CoreResult<Vec<SegmentId>> {
        self.segments
            .read()
            .get(&id)
            .map(|s| s.references().to_vec())
            .ok_or(CoreError::SegmentNotFound { id })
    }

    fn journal(&self, name: &str) -> CoreResult<Arc<Journal>> {
        let mut journals = self.journals.lock();
        let journal = journals.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Journal::new(name, None, None, Arc::clone(&self.stats)))
        });
        Ok(Arc::clone(journal))
    }

    fn journal_head(&self, name: &str) -> CoreResult<Arc<Journal>> {
        self.journals
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::JournalNotFound {
                name: name.to_string(),
            })
    }

    fn journal_names(&self) -> Vec<String> {
        self.journals.lock().keys().cloned().collect()
    }

    fn flush(&self) -> CoreResult<()> {
        Ok(())
    }

    fn reclaim(
        &self,
        keep: &HashSet<SegmentId>,
        below_generation: Generation,
    ) -> CoreResult<ReclaimReport> {
        let mut report = ReclaimReport::default();
        self.segments.write().retain(|id, segment| {
            let reclaimable = !keep.contains(id) && segment.generation() < below_generation;
            if reclaimable {
                report.segments += 1;
                report.bytes += segment.data().len() as u64;
            }
            !reclaimable
        });
        self.stats.record_delete(report.segments);
        Ok(report)
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
