//! # tarmk cache
//!
//! Document cache tiers.
//!
//! This crate provides:
//! - [`HeapCache`]: a bounded LRU of values in ordinary memory
//! - [`OffHeapCache`]: serialized values in an anonymous memory map, with
//!   lookups and puts that never wait for a lock
//! - [`TieredCache`]: the two composed, promoting and demoting between them
//!
//! All three implement [`DocumentCache`].
//!
//! ```
//! use tarmk_cache::{CacheConfig, CacheKey, DocumentCache, TieredCache};
//!
//! let cache: TieredCache<String> = TieredCache::new(
//!     &CacheConfig::new().heap_capacity(16).off_heap_bytes(1 << 16),
//! ).unwrap();
//! let key = CacheKey::for_version("/content/a", b"rev-1");
//! cache.put(key.clone(), "hello".to_string());
//! assert_eq!(cache.get_if_present(&key).as_deref(), Some("hello"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod heap;
mod key;
mod offheap;
mod stats;
mod tiered;

pub use cache::DocumentCache;
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use heap::HeapCache;
pub use key::{CacheKey, Fingerprint};
pub use offheap::OffHeapCache;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use tiered::TieredCache;
