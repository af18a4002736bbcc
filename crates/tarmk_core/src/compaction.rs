//! Online generational compaction.
//!
//! A compaction rewrites every node reachable from a root into segments
//! of a new generation. Segments of older generations then become
//! unreachable once the compacted root is installed and no lease holds an
//! older root, and cleanup can delete them.
//!
//! The walk is children-first. Each source record is rewritten at most once
//! per compactor (a `RecordId → RecordId` memo), so subtrees shared between
//! the full pass and later incremental passes are not written twice. Every
//! `update_limit` node writes the writer is flushed, which bounds the open
//! segment without changing the output.

use crate::blob::BlobStore;
use crate::config::{CompactionConfig, StoreConfig};
use crate::error::CoreResult;
use crate::node::{diff_node, NodeState, PropertyChange, PropertyValue};
use crate::segment::SegmentReader;
use crate::store::SegmentStore;
use crate::types::{Generation, RecordId};
use crate::writer::SegmentWriter;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Cooperative cancellation signal, polled once per node.
///
/// Clones share the flag.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    predicate: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
}

impl CancellationToken {
    /// Creates a token that is cancelled only by [`cancel`](Self::cancel).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is also cancelled whenever `predicate` is true.
    #[must_use]
    pub fn from_fn<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            flag: Arc::default(),
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire) || self.predicate.as_ref().is_some_and(|p| p())
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.flag.load(Ordering::Acquire))
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Counters of one compactor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Nodes examined.
    pub nodes_visited: u64,
    /// Records written in the target generation.
    pub nodes_written: u64,
    /// Nodes taken over without rewriting.
    pub nodes_reused: u64,
    /// Intermediate flushes forced by the update limit.
    pub checkpoints: u64,
}

/// How [`SegmentNodeStore::compact`](crate::SegmentNodeStore::compact)
/// ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStatus {
    /// The compacted root is the new head.
    Installed,
    /// The token was cancelled; nothing was installed.
    Cancelled,
    /// Concurrent commits won every install attempt.
    GaveUp,
}

/// Result of a store-level compaction.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    /// How the run ended.
    pub status: CompactionStatus,
    /// The store's generation afterwards.
    pub generation: Generation,
    /// Work done.
    pub stats: CompactionStats,
    /// The installed root.
    pub root: Option<NodeState>,
}

/// Rewrites trees into one target generation.
pub struct Compactor {
    writer: SegmentWriter,
    reader: Arc<SegmentReader>,
    update_limit: u64,
    memo: HashMap<RecordId, RecordId>,
    memo_capacity: usize,
    stats: CompactionStats,
    since_checkpoint: u64,
}

impl Compactor {
    /// Creates a compactor writing segments of `config.generation`.
    pub fn new(
        store: Arc<dyn SegmentStore>,
        blobs: Arc<dyn BlobStore>,
        reader: Arc<SegmentReader>,
        store_config: &StoreConfig,
        config: &CompactionConfig,
    ) -> Self {
        Self {
            writer: SegmentWriter::new(store, blobs, config.generation, store_config),
            reader,
            update_limit: config.update_limit.max(1),
            memo: HashMap::new(),
            memo_capacity: store_config.dedup_cache_size.max(1),
            stats: CompactionStats::default(),
            since_checkpoint: 0,
        }
    }

    /// Returns the target generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.writer.generation()
    }

    /// Returns the counters so far.
    #[must_use]
    pub fn stats(&self) -> CompactionStats {
        self.stats
    }

    /// Releases the writer, keeping its dedup state for later commits in
    /// the same generation.
    #[must_use]
    pub fn into_writer(self) -> SegmentWriter {
        self.writer
    }

    /// Rewrites `root` and everything below it.
    ///
    /// Returns `None` if `cancel` fired; records written so far stay in
    /// the store unreferenced.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be read or written.
    pub fn compact(
        &mut self,
        root: &NodeState,
        cancel: &CancellationToken,
    ) -> CoreResult<Option<NodeState>> {
        let Some(id) = self.compact_node(root, cancel)? else {
            return Ok(None);
        };
        self.finish(id).map(Some)
    }

    /// Applies the changes `before → after` to `onto`, a compacted copy of
    /// `before`, rewriting only what changed.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be read or written.
    pub fn compact_incremental(
        &mut self,
        before: &NodeState,
        after: &NodeState,
        onto: &NodeState,
        cancel: &CancellationToken,
    ) -> CoreResult<Option<NodeState>> {
        let Some(id) = self.incremental_node(before, after, onto, cancel)? else {
            return Ok(None);
        };
        self.finish(id).map(Some)
    }

    fn finish(&mut self, id: RecordId) -> CoreResult<NodeState> {
        self.writer.flush()?;
        self.since_checkpoint = 0;
        debug!(
            generation = self.generation(),
            visited = self.stats.nodes_visited,
            written = self.stats.nodes_written,
            "compaction pass finished"
        );
        NodeState::load(&self.reader, id)
    }

    fn reusable(&self, node: &NodeState) -> Option<RecordId> {
        let id = node.record_id()?;
        if node.generation() == Some(self.generation()) {
            return Some(id);
        }
        self.memo.get(&id).copied()
    }

    fn compact_node(
        &mut self,
        node: &NodeState,
        cancel: &CancellationToken,
    ) -> CoreResult<Option<RecordId>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.stats.nodes_visited += 1;
        if let Some(id) = self.reusable(node) {
            self.stats.nodes_reused += 1;
            return Ok(Some(id));
        }

        let mut children = BTreeMap::new();
        for (name, child) in node.children()? {
            let Some(id) = self.compact_node(&child, cancel)? else {
                return Ok(None);
            };
            children.insert(name, id);
        }
        self.write(node, node.properties()?, children).map(Some)
    }

    fn incremental_node(
        &mut self,
        before: &NodeState,
        after: &NodeState,
        onto: &NodeState,
        cancel: &CancellationToken,
    ) -> CoreResult<Option<RecordId>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let diff = diff_node(before, after)?;
        if diff.is_empty() {
            return self.compact_node(onto, cancel);
        }
        self.stats.nodes_visited += 1;

        let mut properties = onto.properties()?;
        for (name, change) in diff.properties {
            match change {
                PropertyChange::Added(value) | PropertyChange::Changed { after: value, .. } => {
                    properties.insert(name, value);
                }
                PropertyChange::Deleted(_) => {
                    properties.remove(&name);
                }
            }
        }

        let mut children = BTreeMap::new();
        for (name, child) in onto.children()? {
            if diff.deleted_children.contains_key(&name)
                || diff.changed_children.contains_key(&name)
            {
                continue;
            }
            let Some(id) = self.compact_node(&child, cancel)? else {
                return Ok(None);
            };
            children.insert(name, id);
        }
        for (name, child) in &diff.added_children {
            let Some(id) = self.compact_node(child, cancel)? else {
                return Ok(None);
            };
            children.insert(name.clone(), id);
        }
        for (name, (old, new)) in &diff.changed_children {
            let id = match onto.child(name)? {
                Some(compacted) => self.incremental_node(old, new, &compacted, cancel)?,
                None => self.compact_node(new, cancel)?,
            };
            let Some(id) = id else {
                return Ok(None);
            };
            children.insert(name.clone(), id);
        }

        self.write(after, properties, children).map(Some)
    }

    fn write(
        &mut self,
        source: &NodeState,
        properties: BTreeMap<String, PropertyValue>,
        children: BTreeMap<String, RecordId>,
    ) -> CoreResult<RecordId> {
        let id = self.writer.write_node_record(properties, children)?;
        self.stats.nodes_written += 1;

        if let Some(source) = source.record_id() {
            if self.memo.len() >= self.memo_capacity {
                self.memo.clear();
            }
            self.memo.insert(source, id);
        }

        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.update_limit {
            self.writer.flush()?;
            self.stats.checkpoints += 1;
            self.since_checkpoint = 0;
        }
        Ok(id)
    }
}

impl fmt::Debug for Compactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compactor")
            .field("generation", &self.generation())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::node::NodeBuilder;
    use crate::store::MemoryStore;
    use std::sync::atomic::AtomicUsize;

    struct Fixture {
        store: Arc<MemoryStore>,
        blobs: Arc<MemoryBlobStore>,
        reader: Arc<SegmentReader>,
        config: StoreConfig,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            reader: Arc::new(SegmentReader::new(store.clone())),
            store,
            blobs: Arc::new(MemoryBlobStore::new()),
            config: StoreConfig::default().inline_threshold(16),
        }
    }

    impl Fixture {
        fn persist(&self, node: &NodeState) -> NodeState {
            let mut writer =
                SegmentWriter::new(self.store.clone(), self.blobs.clone(), 0, &self.config);
            let id = writer.write_node(node).unwrap();
            writer.flush().unwrap();
            NodeState::load(&self.reader, id).unwrap()
        }

        fn compactor(&self, config: CompactionConfig) -> Compactor {
            Compactor::new(
                self.store.clone(),
                self.blobs.clone(),
                Arc::clone(&self.reader),
                &self.config,
                &config,
            )
        }
    }

    fn tree(width: i64) -> NodeState {
        let mut builder = NodeBuilder::new(NodeState::empty());
        builder.set_property("blob", PropertyValue::binary(vec![7u8; 64]));
        let content = builder.add_child("content");
        for i in 0..width {
            content.add_child(format!("n{i}")).set_property("i", i);
        }
        builder.node_state().unwrap()
    }

    #[test]
    fn full_compaction_preserves_content() {
        let fx = fixture();
        let root = fx.persist(&tree(20));
        let blobs_before = fx.blobs.len();

        let mut compactor = fx.compactor(CompactionConfig::new(1));
        let compacted = compactor
            .compact(&root, &CancellationToken::new())
            .unwrap()
            .unwrap();

        assert_eq!(compacted.generation(), Some(1));
        assert!(compacted.equals(&root).unwrap());
        let content = compacted.child("content").unwrap().unwrap();
        assert_eq!(content.generation(), Some(1));
        // external blobs are re-referenced, not re-uploaded
        assert_eq!(fx.blobs.len(), blobs_before);
        assert_eq!(compactor.stats().nodes_written, 22);
    }

    #[test]
    fn empty_tree_compacts_to_tagged_empty_node() {
        let fx = fixture();
        let mut compactor = fx.compactor(CompactionConfig::new(5));
        let compacted = compactor
            .compact(&NodeState::empty(), &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(compacted.generation(), Some(5));
        assert_eq!(compacted.child_count().unwrap(), 0);
        assert!(compacted.properties().unwrap().is_empty());
    }

    #[test]
    fn checkpoints_do_not_change_output() {
        let fx = fixture();
        let root = fx.persist(&tree(10));
        let mut compactor = fx.compactor(CompactionConfig::new(1).update_limit(3));
        let compacted = compactor
            .compact(&root, &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert!(compacted.equals(&root).unwrap());
        assert_eq!(compactor.stats().checkpoints, 4);
    }

    #[test]
    fn cancelled_token_stops_the_walk() {
        let fx = fixture();
        let root = fx.persist(&tree(10));
        let token = CancellationToken::new();
        token.cancel();
        let mut compactor = fx.compactor(CompactionConfig::new(1));
        assert!(compactor.compact(&root, &token).unwrap().is_none());
        assert_eq!(compactor.stats().nodes_visited, 0);
    }

    #[test]
    fn predicate_cancels_midway() {
        let fx = fixture();
        let root = fx.persist(&tree(10));
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let token = CancellationToken::from_fn(move || counter.fetch_add(1, Ordering::SeqCst) >= 5);

        let mut compactor = fx.compactor(CompactionConfig::new(1));
        assert!(compactor.compact(&root, &token).unwrap().is_none());
        assert_eq!(compactor.stats().nodes_visited, 5);
        assert!(token.is_cancelled());
    }

    #[test]
    fn already_compacted_tree_is_reused() {
        let fx = fixture();
        let root = fx.persist(&tree(4));
        let mut compactor = fx.compactor(CompactionConfig::new(1));
        let once = compactor
            .compact(&root, &CancellationToken::new())
            .unwrap()
            .unwrap();
        let written = compactor.stats().nodes_written;

        let twice = compactor
            .compact(&once, &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(twice.record_id(), once.record_id());
        assert_eq!(compactor.stats().nodes_written, written);

        // the same source is answered from the memo
        let again = compactor
            .compact(&root, &CancellationToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(again.record_id(), once.record_id());
    }

    #[test]
    fn incremental_applies_concurrent_changes() {
        let fx = fixture();
        let before = fx.persist(&tree(6));
        let mut compactor = fx.compactor(CompactionConfig::new(1));
        let onto = compactor
            .compact(&before, &CancellationToken::new())
            .unwrap()
            .unwrap();

        let mut builder = NodeBuilder::new(before.clone());
        builder.set_property("title", "changed");
        let content = builder.child_mut("content").unwrap().unwrap();
        content.remove_child("n0").unwrap();
        content.add_child("fresh");
        content.child_mut("n1").unwrap().unwrap().set_property("i", 100i64);
        let after = fx.persist(&builder.node_state().unwrap());

        let written = compactor.stats().nodes_written;
        let result = compactor
            .compact_incremental(&before, &after, &onto, &CancellationToken::new())
            .unwrap()
            .unwrap();

        assert!(result.equals(&after).unwrap());
        assert_eq!(result.generation(), Some(1));
        // root, content, n1 and the new child
        assert_eq!(compactor.stats().nodes_written - written, 4);
        let content = result.child("content").unwrap().unwrap();
        let unchanged = content.child("n2").unwrap().unwrap();
        let original = onto.child("content").unwrap().unwrap().child("n2").unwrap().unwrap();
        assert_eq!(unchanged.record_id(), original.record_id());
    }
}
