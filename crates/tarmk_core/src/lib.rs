//! # tarmk core
//!
//! Persistence and consistency core of a hierarchical content repository.
//!
//! This crate provides:
//! - Segments: immutable, content-addressed batches of node records
//! - Segment stores: in memory, or appended to tar containers on disk
//! - Journals: named, atomically swapped pointers to a root record
//! - Node states and builders: immutable snapshots with copy-on-write edits
//! - Branch and merge: optimistic commits with hooks and three-way rebase
//! - Compaction: rewriting the live tree into a new generation, online
//! - Cleanup: reclaiming segments no root or lease can reach
//!
//! ```rust,ignore
//! use tarmk_core::{CommitHooks, SegmentNodeStore, StoreConfig};
//!
//! let store = SegmentNodeStore::open_dir(path, StoreConfig::default())?;
//! let mut branch = store.branch()?;
//! branch.builder_mut().add_child("content").set_property("title", "hello");
//! branch.merge(&CommitHooks::empty(), None)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob;
mod branch;
mod compaction;
mod config;
mod error;
mod gc;
mod node;
mod nodestore;
mod segment;
mod stats;
mod store;
mod types;
mod writer;

pub use blob::{BlobId, BlobStore, FileBlobStore, MemoryBlobStore};
pub use branch::{
    rebase_node, Branch, BranchState, CommitHook, CommitHooks, PostCommitHook,
};
pub use compaction::{
    CancellationToken, CompactionOutcome, CompactionStats, CompactionStatus, Compactor,
};
pub use config::{CompactionConfig, StoreConfig};
pub use error::{CoreError, CoreResult};
pub use gc::{CleanupReport, RootLease};
pub use node::{diff_node, Blob, NodeBuilder, NodeDiff, NodeState, PropertyChange, PropertyValue};
pub use nodestore::{SegmentNodeStore, ROOT_JOURNAL};
pub use segment::{Segment, SegmentBuilder, SegmentReader, SEGMENT_MAGIC, SEGMENT_VERSION};
pub use stats::{StatsSnapshot, StoreStats, WriterStats};
pub use store::{Journal, JournalLog, MemoryStore, ReclaimReport, SegmentStore, TarStore};
pub use types::{Generation, RecordId, SegmentId};
pub use writer::SegmentWriter;
