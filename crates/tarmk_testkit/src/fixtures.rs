//! Test fixtures and store helpers.
//!
//! Provides node stores for tests, either in memory or in a temporary
//! directory that is removed when the fixture is dropped.

use std::path::Path;
use std::sync::{Arc, Once};
use tarmk_core::{
    CommitHooks, MemoryBlobStore, MemoryStore, NodeBuilder, NodeState, SegmentNodeStore,
    StoreConfig,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber writing to the test output.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Safe to call
/// from every test; only the first call installs.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A node store with automatic cleanup.
pub struct TestStore {
    /// The store.
    pub store: SegmentNodeStore,
    config: StoreConfig,
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store.
    pub fn memory() -> Self {
        Self::memory_with(StoreConfig::default())
    }

    /// Creates an in-memory store with `config`.
    pub fn memory_with(config: StoreConfig) -> Self {
        init_tracing();
        let store = SegmentNodeStore::open(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBlobStore::new()),
            config.clone(),
        )
        .expect("Failed to open in-memory store");
        Self {
            store,
            config,
            temp_dir: None,
        }
    }

    /// Creates a tar-backed store in a temporary directory.
    pub fn tar() -> Self {
        Self::tar_with(StoreConfig::default())
    }

    /// Creates a tar-backed store with `config`.
    pub fn tar_with(config: StoreConfig) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = SegmentNodeStore::open_dir(temp_dir.path(), config.clone())
            .expect("Failed to open tar store");
        Self {
            store,
            config,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if tar-backed.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes and reopens a tar-backed store from its directory.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores.
    pub fn reopen(self) -> Self {
        let Self {
            store,
            config,
            temp_dir,
        } = self;
        let temp_dir = temp_dir.expect("Only tar stores can be reopened");
        // release the directory lock first
        drop(store);
        let store =
            SegmentNodeStore::open_dir(temp_dir.path(), config.clone()).expect("Failed to reopen");
        Self {
            store,
            config,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = SegmentNodeStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_memory_store<F, R>(f: F) -> R
where
    F: FnOnce(&SegmentNodeStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary tar-backed store.
pub fn with_tar_store<F, R>(f: F) -> R
where
    F: FnOnce(&SegmentNodeStore, &Path) -> R,
{
    let test_store = TestStore::tar();
    let path = test_store.path().expect("Tar store should have a path");
    f(&test_store.store, path)
}

/// Merges the edits made by `edit` on a fresh branch.
pub fn commit<F>(store: &SegmentNodeStore, edit: F) -> NodeState
where
    F: FnOnce(&mut NodeBuilder),
{
    let mut branch = store.branch().expect("Failed to branch");
    edit(branch.builder_mut());
    branch
        .merge(&CommitHooks::empty(), None)
        .expect("Failed to merge")
}

/// Returns the node at `path` ("/a/b") under `root`.
pub fn node_at(root: &NodeState, path: &str) -> Option<NodeState> {
    let mut node = root.clone();
    for name in path.split('/').filter(|s| !s.is_empty()) {
        node = node.child(name).expect("Failed to read child")?;
    }
    Some(node)
}

/// Copies `node` and everything below it into memory.
///
/// Stored nodes keep their segment store open; a detached copy does not,
/// so it can be compared against the same store after a reopen.
pub fn detached(node: &NodeState) -> NodeState {
    let children = node
        .children()
        .expect("Failed to read children")
        .into_iter()
        .map(|(name, child)| (name, detached(&child)))
        .collect();
    NodeState::new(node.properties().expect("Failed to read properties"), children)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Commits `children` children under `/content`, one commit each.
    pub fn populated_store(store: &SegmentNodeStore, children: usize) {
        for i in 0..children {
            commit(store, |root| {
                if !root.has_child("content").expect("read") {
                    root.add_child("content");
                }
                let content = root
                    .child_mut("content")
                    .expect("read")
                    .expect("content exists");
                let node = content.add_child(format!("node{i}"));
                node.set_property("index", i as i64);
                node.set_property("title", format!("Node {i}"));
            });
        }
    }

    /// Builds a balanced tree with `fanout` children per node, `depth`
    /// levels below the root.
    pub fn balanced_tree(depth: usize, fanout: usize) -> NodeState {
        fn fill(builder: &mut NodeBuilder, depth: usize, fanout: usize, prefix: &str) {
            builder.set_property("path", prefix.to_string());
            if depth == 0 {
                return;
            }
            for i in 0..fanout {
                let name = format!("c{i}");
                let child = builder.add_child(name.as_str());
                fill(child, depth - 1, fanout, &format!("{prefix}/{name}"));
            }
        }

        let mut builder = NodeBuilder::new(NodeState::empty());
        fill(&mut builder, depth, fanout, "");
        builder.node_state().expect("Failed to build tree")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_starts_empty() {
        let store = TestStore::memory();
        assert!(store.head().is_none());
    }

    #[test]
    fn tar_store_survives_reopen() {
        let store = TestStore::tar();
        commit(&store, |root| {
            root.add_child("a").set_property("v", 1i64);
        });
        let head = store.head();

        let store = store.reopen();
        assert_eq!(store.head(), head);
        let root = store.get_root().unwrap();
        assert!(node_at(&root, "/a").is_some());
    }

    #[test]
    fn detached_copy_outlives_store() {
        let store = TestStore::tar();
        scenarios::populated_store(&store, 3);
        let copy = detached(&store.get_root().unwrap());
        assert!(copy.record_id().is_none());

        let store = store.reopen();
        assert!(store.get_root().unwrap().equals(&copy).unwrap());
    }

    #[test]
    fn populated_scenario() {
        with_memory_store(|store| {
            scenarios::populated_store(store, 5);
            let root = store.get_root().unwrap();
            let content = node_at(&root, "/content").unwrap();
            assert_eq!(content.child_count().unwrap(), 5);
        });
    }

    #[test]
    fn balanced_tree_size() {
        let tree = scenarios::balanced_tree(2, 3);
        assert_eq!(tree.count_nodes().unwrap(), 1 + 3 + 9);
        assert!(node_at(&tree, "/c2/c1").is_some());
    }
}
