//! # tarmk testkit
//!
//! Test utilities for tarmk.
//!
//! This crate provides:
//! - Fixtures: node stores in memory or in a temporary directory
//! - Property-based generators for trees and edits using proptest
//! - Stress helpers running concurrent merges and compactions
//! - Tracing setup for tests
//!
//! The cross-crate integration tests live in `tests/`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tarmk_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     with_memory_store(|store| {
//!         let mut branch = store.branch().unwrap();
//!         branch.builder_mut().add_child("a");
//!         branch.merge(&CommitHooks::empty(), None).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use tarmk_core::{CommitHooks, NodeBuilder, NodeState, SegmentNodeStore, StoreConfig};
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
