//! Store statistics.
//!
//! Segment stores keep atomic counters that can be read while writers and
//! readers are active. Writers and compactors are single-threaded and keep
//! plain counters instead (see [`WriterStats`] and
//! [`CompactionStats`](crate::CompactionStats)).

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by a segment store.
#[derive(Debug, Default)]
pub struct StoreStats {
    segments_written: AtomicU64,
    segments_read: AtomicU64,
    segments_deleted: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    journal_updates: AtomicU64,
    containers_created: AtomicU64,
    containers_reclaimed: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.segments_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.segments_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, count: u64) {
        self.segments_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_journal_update(&self) {
        self.journal_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_container_created(&self) {
        self.containers_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_container_reclaimed(&self) {
        self.containers_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of segments written.
    pub fn segments_written(&self) -> u64 {
        self.segments_written.load(Ordering::Relaxed)
    }

    /// Returns the number of segment reads served.
    pub fn segments_read(&self) -> u64 {
        self.segments_read.load(Ordering::Relaxed)
    }

    /// Returns the number of segments deleted by reclamation.
    pub fn segments_deleted(&self) -> u64 {
        self.segments_deleted.load(Ordering::Relaxed)
    }

    /// Returns the total segment bytes written.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the total segment bytes read.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns the number of journal head updates.
    pub fn journal_updates(&self) -> u64 {
        self.journal_updates.load(Ordering::Relaxed)
    }

    /// Returns the number of tar containers opened for writing.
    pub fn containers_created(&self) -> u64 {
        self.containers_created.load(Ordering::Relaxed)
    }

    /// Returns the number of tar containers deleted.
    pub fn containers_reclaimed(&self) -> u64 {
        self.containers_reclaimed.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            segments_written: self.segments_written(),
            segments_read: self.segments_read(),
            segments_deleted: self.segments_deleted(),
            bytes_written: self.bytes_written(),
            bytes_read: self.bytes_read(),
            journal_updates: self.journal_updates(),
            containers_created: self.containers_created(),
            containers_reclaimed: self.containers_reclaimed(),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Segments written.
    pub segments_written: u64,
    /// Segment reads served.
    pub segments_read: u64,
    /// Segments deleted by reclamation.
    pub segments_deleted: u64,
    /// Segment bytes written.
    pub bytes_written: u64,
    /// Segment bytes read.
    pub bytes_read: u64,
    /// Journal head updates.
    pub journal_updates: u64,
    /// Tar containers opened for writing.
    pub containers_created: u64,
    /// Tar containers deleted.
    pub containers_reclaimed: u64,
}

/// Counters kept by one [`SegmentWriter`](crate::SegmentWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterStats {
    /// Records appended to segments.
    pub records_written: u64,
    /// Records answered from the dedup cache.
    pub records_deduplicated: u64,
    /// Segment-backed nodes returned without re-emission.
    pub nodes_reused: u64,
    /// Segments handed to the store.
    pub segments_flushed: u64,
    /// Binary values moved to the blob store.
    pub blobs_externalized: u64,
}
