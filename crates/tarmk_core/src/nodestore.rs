//! The node store: a root journal over a segment store.

use crate::blob::{BlobStore, FileBlobStore, MemoryBlobStore};
use crate::branch::{Branch, CommitHooks, PostCommitHook};
use crate::compaction::{
    CancellationToken, CompactionOutcome, CompactionStats, CompactionStatus, Compactor,
};
use crate::config::{CompactionConfig, StoreConfig};
use crate::error::{CoreError, CoreResult};
use crate::gc::{mark, CleanupReport, LeaseRegistry, LeaseTable, RootLease};
use crate::node::NodeState;
use crate::segment::SegmentReader;
use crate::store::{Journal, MemoryStore, SegmentStore, TarStore};
use crate::types::{Generation, RecordId};
use crate::writer::SegmentWriter;
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the journal holding the repository root.
pub const ROOT_JOURNAL: &str = "root";

/// Directory under a tar store holding its blobs.
const BLOB_DIR: &str = "blobs";

struct StoreInner {
    store: Arc<dyn SegmentStore>,
    blobs: Arc<dyn BlobStore>,
    reader: Arc<SegmentReader>,
    root: Arc<Journal>,
    writer: Mutex<SegmentWriter>,
    generation: AtomicU32,
    leases: Arc<LeaseRegistry>,
    config: StoreConfig,
}

/// Versioned tree of nodes persisted in a [`SegmentStore`].
///
/// Cloning is cheap; clones share the store, the writer and the leases.
///
/// # Example
///
/// ```rust,ignore
/// use tarmk_core::{CommitHooks, SegmentNodeStore};
///
/// let store = SegmentNodeStore::in_memory()?;
/// let mut branch = store.branch()?;
/// branch.builder_mut().add_child("content").set_property("title", "hello");
/// let root = branch.merge(&CommitHooks::empty(), None)?;
/// assert!(root.has_child("content")?);
/// ```
#[derive(Clone)]
pub struct SegmentNodeStore {
    inner: Arc<StoreInner>,
}

impl SegmentNodeStore {
    /// Opens a node store over `store`, continuing from its root journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the root journal's head cannot be read.
    pub fn open(
        store: Arc<dyn SegmentStore>,
        blobs: Arc<dyn BlobStore>,
        config: StoreConfig,
    ) -> CoreResult<Self> {
        let root = store.journal(ROOT_JOURNAL)?;
        let generation = match root.head() {
            Some(head) => store.generation(head.segment())?,
            None => 0,
        };
        let writer = SegmentWriter::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            generation,
            &config,
        );
        info!(generation, head = ?root.head(), "node store opened");

        Ok(Self {
            inner: Arc::new(StoreInner {
                reader: Arc::new(SegmentReader::new(Arc::clone(&store))),
                store,
                blobs,
                root,
                writer: Mutex::new(writer),
                generation: AtomicU32::new(generation),
                leases: Arc::new(LeaseRegistry::new()),
                config,
            }),
        })
    }

    /// Opens a tar-backed node store in `path`, with blobs under
    /// `path/blobs`.
    ///
    /// # Errors
    ///
    /// Returns `StoreLocked` if another process holds the directory, or an
    /// error from opening the containers.
    pub fn open_dir(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let store = TarStore::open(path, config.clone())?;
        let blobs = FileBlobStore::open(&path.join(BLOB_DIR))?;
        Self::open(Arc::new(store), Arc::new(blobs), config)
    }

    /// Creates an empty node store held in memory.
    ///
    /// # Errors
    ///
    /// Does not fail in practice; the signature matches [`open`](Self::open).
    pub fn in_memory() -> CoreResult<Self> {
        Self::open(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBlobStore::new()),
            StoreConfig::default(),
        )
    }

    /// Returns the segment store.
    #[must_use]
    pub fn segment_store(&self) -> &Arc<dyn SegmentStore> {
        &self.inner.store
    }

    /// Returns the blob store.
    #[must_use]
    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.inner.blobs
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Returns the generation new segments are written with.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Returns the root journal's head.
    #[must_use]
    pub fn head(&self) -> Option<RecordId> {
        self.inner.root.head()
    }

    /// Returns the number of leases currently held.
    #[must_use]
    pub fn active_leases(&self) -> usize {
        self.inner.leases.len()
    }

    fn load(&self, head: Option<RecordId>) -> CoreResult<NodeState> {
        match head {
            Some(id) => NodeState::load(&self.inner.reader, id),
            None => Ok(NodeState::empty()),
        }
    }

    /// Returns the current root.
    ///
    /// The root and every node read through it stay readable across
    /// compaction and cleanup until the last of them is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the head record cannot be read.
    pub fn get_root(&self) -> CoreResult<NodeState> {
        Ok(self.retain_root()?.into_root())
    }

    /// Returns the current root, protected from reclamation until the
    /// lease is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the head record cannot be read.
    pub fn retain_root(&self) -> CoreResult<RootLease> {
        let mut table = self.inner.leases.lock();
        let head = self.head();
        let root = self.load(head)?;
        Ok(self.register(&mut table, head, root))
    }

    fn register(&self, table: &mut LeaseTable, head: Option<RecordId>, root: NodeState) -> RootLease {
        let generation = root.generation().unwrap_or_else(|| self.generation());
        let id = table.register(head, generation);
        RootLease::new(Arc::clone(&self.inner.leases), id, root, head, generation)
    }

    /// Starts a branch from the current root.
    ///
    /// # Errors
    ///
    /// Returns an error if the head record cannot be read.
    pub fn branch(&self) -> CoreResult<Branch> {
        Ok(Branch::new(self.clone(), self.retain_root()?))
    }

    /// Merges `branch`; see [`Branch::merge`].
    ///
    /// # Errors
    ///
    /// As [`Branch::merge`].
    pub fn merge(
        &self,
        branch: &mut Branch,
        hooks: &CommitHooks,
        post_commit: Option<&PostCommitHook>,
    ) -> CoreResult<NodeState> {
        branch.merge(hooks, post_commit)
    }

    /// Writes `root` and moves the journal from `expected` to it.
    ///
    /// Returns `None` when the journal no longer points at `expected`.
    /// The committed root comes back leased, registered before the writer
    /// lock is released so no cleanup can slip in between.
    pub(crate) fn commit(
        &self,
        expected: Option<RecordId>,
        root: &NodeState,
    ) -> CoreResult<Option<NodeState>> {
        let mut writer = self.inner.writer.lock();
        let id = writer.write_node(root)?;
        writer.flush()?;
        self.inner.store.flush()?;
        if !self.inner.root.compare_and_set(expected, id)? {
            return Ok(None);
        }
        let committed = self.load(Some(id))?;
        let lease = self.register(&mut self.inner.leases.lock(), Some(id), committed);
        drop(writer);
        Ok(Some(lease.into_root()))
    }

    /// Rewrites the current root into a new generation and installs it.
    ///
    /// Commits that land while the full pass runs are carried over with
    /// incremental compaction before each install attempt. After
    /// `compaction_retries` lost attempts the result is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be read or written.
    pub fn compact(&self, cancel: &CancellationToken) -> CoreResult<CompactionOutcome> {
        let mut base = self.retain_root()?;
        let current = self.generation();
        let target = current + 1;
        let mut compactor = Compactor::new(
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.blobs),
            Arc::clone(&self.inner.reader),
            &self.inner.config,
            &CompactionConfig::new(target),
        );

        let cancelled = |stats: CompactionStats| {
            info!(generation = current, "compaction cancelled");
            Ok(CompactionOutcome {
                status: CompactionStatus::Cancelled,
                generation: current,
                stats,
                root: None,
            })
        };

        let Some(mut compacted) = compactor.compact(base.root(), cancel)? else {
            return cancelled(compactor.stats());
        };

        let retries = self.inner.config.compaction_retries.max(1);
        for attempt in 1..=retries {
            {
                let mut writer = self.inner.writer.lock();
                let head = self.head();
                if head == base.head() {
                    let id = compacted.record_id().ok_or_else(|| {
                        CoreError::invalid_operation("compacted root is not stored")
                    })?;
                    self.inner.store.flush()?;
                    if self.inner.root.compare_and_set(head, id)? {
                        let stats = compactor.stats();
                        *writer = compactor.into_writer();
                        self.inner.generation.store(target, Ordering::Release);
                        let installed = self
                            .register(&mut self.inner.leases.lock(), Some(id), compacted)
                            .into_root();
                        info!(
                            generation = target,
                            attempt,
                            visited = stats.nodes_visited,
                            written = stats.nodes_written,
                            reused = stats.nodes_reused,
                            "compaction installed"
                        );
                        return Ok(CompactionOutcome {
                            status: CompactionStatus::Installed,
                            generation: target,
                            stats,
                            root: Some(installed),
                        });
                    }
                }
            }

            let head = self.retain_root()?;
            debug!(attempt, retries, "commits landed during compaction, catching up");
            match compactor.compact_incremental(base.root(), head.root(), &compacted, cancel)? {
                Some(next) => compacted = next,
                None => return cancelled(compactor.stats()),
            }
            base = head;
        }

        warn!(retries, "compaction gave up, could not install");
        Ok(CompactionOutcome {
            status: CompactionStatus::GaveUp,
            generation: current,
            stats: compactor.stats(),
            root: None,
        })
    }

    /// Deletes segments no journal head or leased root can reach and whose
    /// generation is below the watermark.
    ///
    /// # Errors
    ///
    /// Returns an error if reference lists cannot be read or a container
    /// cannot be deleted.
    pub fn cleanup(&self) -> CoreResult<CleanupReport> {
        let _writer = self.inner.writer.lock();
        let table = self.inner.leases.lock();
        let store = &self.inner.store;

        let mut roots = Vec::new();
        for name in store.journal_names() {
            if let Some(head) = store.journal_head(&name)?.head() {
                roots.push(head.segment());
            }
        }
        roots.extend(table.heads().map(|head| head.segment()));
        let keep = mark(store.as_ref(), roots)?;

        let current = self.generation();
        let watermark = table
            .oldest_generation()
            .map_or(current, |oldest| oldest.min(current));
        let reclaimed = store.reclaim(&keep, watermark)?;
        drop(table);

        let report = CleanupReport {
            segments: reclaimed.segments,
            containers: reclaimed.containers,
            bytes: reclaimed.bytes,
            watermark,
            retained: keep.len(),
        };
        info!(
            segments = report.segments,
            containers = report.containers,
            bytes = report.bytes,
            watermark,
            retained = report.retained,
            "cleanup finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for SegmentNodeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentNodeStore")
            .field("head", &self.head())
            .field("generation", &self.generation())
            .field("leases", &self.active_leases())
            .finish_non_exhaustive()
    }
}
