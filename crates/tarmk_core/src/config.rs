//! Store and compaction configuration.

use crate::types::Generation;

/// Configuration for segment stores, writers and merges.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Size past which a tar container is sealed and a new one opened.
    pub max_container_size: u64,

    /// Byte size past which the writer rolls to a new segment.
    pub max_segment_size: usize,

    /// Record count past which the writer rolls to a new segment.
    pub max_segment_records: usize,

    /// Binary values longer than this go to the blob store.
    pub inline_threshold: usize,

    /// Entries kept in the writer's dedup cache before it is cleared.
    pub dedup_cache_size: usize,

    /// Merge attempts before a conflict is surfaced.
    pub merge_retries: u32,

    /// Install attempts for a finished compaction.
    pub compaction_retries: u32,

    /// Whether `flush` syncs containers and the journal log to disk.
    pub sync_on_flush: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_container_size: 256 * 1024 * 1024, // 256 MB
            max_segment_size: 256 * 1024,          // 256 KB
            max_segment_records: 4096,
            inline_threshold: 4096,
            dedup_cache_size: 65_536,
            merge_retries: 5,
            compaction_retries: 5,
            sync_on_flush: true,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the container rollover size.
    #[must_use]
    pub const fn max_container_size(mut self, size: u64) -> Self {
        self.max_container_size = size;
        self
    }

    /// Sets the segment rollover size.
    #[must_use]
    pub const fn max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the maximum records per segment.
    #[must_use]
    pub const fn max_segment_records(mut self, count: usize) -> Self {
        self.max_segment_records = count;
        self
    }

    /// Sets the inline binary threshold.
    #[must_use]
    pub const fn inline_threshold(mut self, size: usize) -> Self {
        self.inline_threshold = size;
        self
    }

    /// Sets the dedup cache capacity.
    #[must_use]
    pub const fn dedup_cache_size(mut self, entries: usize) -> Self {
        self.dedup_cache_size = entries;
        self
    }

    /// Sets the merge retry bound.
    #[must_use]
    pub const fn merge_retries(mut self, retries: u32) -> Self {
        self.merge_retries = retries;
        self
    }

    /// Sets the compaction install retry bound.
    #[must_use]
    pub const fn compaction_retries(mut self, retries: u32) -> Self {
        self.compaction_retries = retries;
        self
    }

    /// Sets whether flushes sync to disk.
    #[must_use]
    pub const fn sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }
}

/// Configuration for one compaction run.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Node writes between forced segment flushes.
    pub update_limit: u64,

    /// Generation stamped on every segment the run writes.
    pub generation: Generation,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            update_limit: 10_000,
            generation: 1,
        }
    }
}

impl CompactionConfig {
    /// Creates a configuration targeting `generation`.
    #[must_use]
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    /// Sets the checkpoint interval. Zero is treated as one.
    #[must_use]
    pub const fn update_limit(mut self, limit: u64) -> Self {
        self.update_limit = limit;
        self
    }

    /// Sets the target generation.
    #[must_use]
    pub const fn generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }
}
