//! # tarmk storage
//!
//! Byte-level substrate for tarmk containers.
//!
//! A backend is an **opaque, append-only byte sequence**. It knows nothing
//! about tar headers, segments or journals; `tarmk_core` owns every format.
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] - a buffer, for tests that forge container bytes
//! - [`FileBackend`] - one file per container
//!
//! ## Example
//!
//! ```rust
//! use tarmk_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"segment bytes").unwrap();
//! assert_eq!(backend.read_at(offset, 7).unwrap(), b"segment");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
