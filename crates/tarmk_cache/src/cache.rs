//! The cache interface shared by all tiers.

use crate::key::CacheKey;
use crate::stats::CacheStatsSnapshot;

/// A best-effort document cache.
///
/// Nothing here fails: a lookup that cannot be answered is a miss, and a
/// put that cannot be stored returns `false`. A logical id holds at most
/// one version; putting a new version replaces the old one.
pub trait DocumentCache<V>: Send + Sync {
    /// Returns the value stored under exactly `key`.
    fn get_if_present(&self, key: &CacheKey) -> Option<V>;

    /// Returns the cached version of document `id`, whatever its
    /// fingerprint.
    fn get_by_id(&self, id: &str) -> Option<V>;

    /// Stores `value`. Returns false if the tier refused it.
    fn put(&self, key: CacheKey, value: V) -> bool;

    /// Drops document `id`. Returns whether anything was cached.
    fn invalidate(&self, id: &str) -> bool;

    /// Returns the tier's counters.
    fn stats(&self) -> CacheStatsSnapshot;
}
