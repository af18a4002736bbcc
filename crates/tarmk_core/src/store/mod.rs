//! Segment stores and journals.
//!
//! A [`SegmentStore`] is a content-addressed map from [`SegmentId`] to an
//! immutable [`Segment`]. Two implementations share the contract:
//!
//! - [`MemoryStore`] - segments in a map, for tests and ephemeral stores
//! - [`TarStore`] - segments appended to tar containers on disk
//!
//! Each store also owns its named [`Journal`]s, the mutable pointers that
//! make a snapshot visible.

mod journal;
mod memory;
mod tar;

pub use self::journal::{Journal, JournalLog};
pub use self::memory::MemoryStore;
pub use self::tar::TarStore;

use crate::error::CoreResult;
use crate::segment::Segment;
use crate::stats::StatsSnapshot;
use crate::types::{Generation, SegmentId};
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;

/// What one reclamation pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Segments removed from the store.
    pub segments: u64,
    /// Tar containers deleted from disk.
    pub containers: u64,
    /// Bytes released.
    pub bytes: u64,
}

/// Content-addressed storage of immutable segments.
///
/// # Invariants
///
/// - once written, a segment's data and references never change
/// - every referenced segment is present when a segment is written
/// - `delete` and `reclaim` are used only by reclamation
///
/// Implementations are safe for concurrent readers while one writer
/// appends.
pub trait SegmentStore: Send + Sync {
    /// Stores a segment.
    ///
    /// # Errors
    ///
    /// Returns `SegmentExists` if `id` is already present (the stored bytes
    /// are left unchanged), `SegmentNotFound` if a reference is missing,
    /// `InvalidFormat` if `data` is not a segment, or an I/O error.
    fn write(&self, id: SegmentId, data: Bytes, references: Vec<SegmentId>) -> CoreResult<()>;

    /// Returns the segment stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns `SegmentNotFound` if absent, or an I/O or corruption error.
    fn read(&self, id: SegmentId) -> CoreResult<Arc<Segment>>;

    /// Removes a segment.
    ///
    /// # Errors
    ///
    /// Returns `SegmentNotFound` if absent.
    fn delete(&self, id: SegmentId) -> CoreResult<()>;

    /// Returns whether `id` is present.
    fn contains(&self, id: SegmentId) -> bool;

    /// Returns every stored segment id, in no particular order.
    fn segment_ids(&self) -> Vec<SegmentId>;

    /// Returns the generation of segment `id`.
    ///
    /// # Errors
    ///
    /// Returns `SegmentNotFound` if absent.
    fn generation(&self, id: SegmentId) -> CoreResult<Generation>;

    /// Returns the references of segment `id` without its data.
    ///
    /// # Errors
    ///
    /// Returns `SegmentNotFound` if absent.
    fn references(&self, id: SegmentId) -> CoreResult<Vec<SegmentId>> {
        Ok(self.read(id)?.references().to_vec())
    }

    /// Returns journal `name`, creating it at the empty snapshot if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if a new journal cannot be recorded.
    fn journal(&self, name: &str) -> CoreResult<Arc<Journal>>;

    /// Returns journal `name` without creating it.
    ///
    /// # Errors
    ///
    /// Returns `JournalNotFound` if no such journal exists.
    fn journal_head(&self, name: &str) -> CoreResult<Arc<Journal>>;

    /// Returns the names of all journals.
    fn journal_names(&self) -> Vec<String>;

    /// Makes everything written so far durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn flush(&self) -> CoreResult<()>;

    /// Removes segments not in `keep` whose generation is below
    /// `below_generation`.
    ///
    /// # Errors
    ///
    /// Returns an error if files cannot be removed.
    fn reclaim(
        &self,
        keep: &HashSet<SegmentId>,
        below_generation: Generation,
    ) -> CoreResult<ReclaimReport>;

    /// Returns a snapshot of the store's counters.
    fn stats(&self) -> StatsSnapshot;
}
