//! Root leases and reclamation of unreachable segments.
//!
//! A segment may be deleted only when no journal head and no leased root
//! reaches it and its generation is below the watermark, the lowest
//! generation still leased (or the current one when nothing is leased).
//! Leases are registered while the registry lock is held, and cleanup
//! holds the same lock from mark to sweep, so a root captured by a reader
//! is either visible to the mark or captured after the sweep.
//!
//! A lease stays registered while anything derived from its root is alive:
//! the root and every stored child loaded through it share one
//! [`LeaseGuard`].

use crate::error::CoreResult;
use crate::node::NodeState;
use crate::store::SegmentStore;
use crate::types::{Generation, RecordId, SegmentId};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// What one cleanup pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Segments removed.
    pub segments: u64,
    /// Tar containers deleted.
    pub containers: u64,
    /// Bytes released.
    pub bytes: u64,
    /// Segments of a generation at or above this were kept regardless.
    pub watermark: Generation,
    /// Segments found reachable.
    pub retained: usize,
}

#[derive(Debug, Clone, Copy)]
struct LeaseEntry {
    head: Option<RecordId>,
    generation: Generation,
}

/// Leases currently held against one node store.
#[derive(Debug, Default)]
pub(crate) struct LeaseRegistry {
    table: Mutex<LeaseTable>,
}

#[derive(Debug, Default)]
pub(crate) struct LeaseTable {
    next_id: u64,
    leases: BTreeMap<u64, LeaseEntry>,
}

impl LeaseRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, LeaseTable> {
        self.table.lock()
    }

    pub(crate) fn len(&self) -> usize {
        self.table.lock().leases.len()
    }

    fn release(&self, id: u64) {
        self.table.lock().leases.remove(&id);
    }
}

impl LeaseTable {
    pub(crate) fn register(&mut self, head: Option<RecordId>, generation: Generation) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.leases.insert(id, LeaseEntry { head, generation });
        id
    }

    pub(crate) fn oldest_generation(&self) -> Option<Generation> {
        self.leases.values().map(|lease| lease.generation).min()
    }

    pub(crate) fn heads(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.leases.values().filter_map(|lease| lease.head)
    }
}

/// One registered lease, released when the last holder drops it.
pub(crate) struct LeaseGuard {
    registry: Arc<LeaseRegistry>,
    id: u64,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

/// A captured root that blocks reclamation of everything it reaches
/// until it and every node read through it are dropped.
pub struct RootLease {
    guard: Arc<LeaseGuard>,
    root: NodeState,
    head: Option<RecordId>,
    generation: Generation,
}

impl RootLease {
    pub(crate) fn new(
        registry: Arc<LeaseRegistry>,
        id: u64,
        root: NodeState,
        head: Option<RecordId>,
        generation: Generation,
    ) -> Self {
        let guard = Arc::new(LeaseGuard { registry, id });
        Self {
            root: root.pinned(&guard),
            guard,
            head,
            generation,
        }
    }

    /// Returns the leased root.
    #[must_use]
    pub fn root(&self) -> &NodeState {
        &self.root
    }

    /// Returns the journal head the root was loaded from.
    #[must_use]
    pub fn head(&self) -> Option<RecordId> {
        self.head
    }

    /// Returns the generation protected by this lease.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Gives up the handle, keeping the root. The lease lasts as long as
    /// the returned node or anything read through it.
    #[must_use]
    pub fn into_root(self) -> NodeState {
        self.root
    }
}

impl fmt::Debug for RootLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootLease")
            .field("id", &self.guard.id)
            .field("head", &self.head)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Returns every segment reachable from `roots` through reference lists.
pub(crate) fn mark(
    store: &dyn SegmentStore,
    roots: impl IntoIterator<Item = SegmentId>,
) -> CoreResult<HashSet<SegmentId>> {
    let mut reachable = HashSet::new();
    let mut pending: Vec<SegmentId> = roots.into_iter().collect();
    while let Some(id) = pending.pop() {
        if reachable.insert(id) {
            pending.extend(store.references(id)?);
        }
    }
    Ok(reachable)
}
