//! Cache configuration.

/// Sizes of the cache tiers.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entries held by the in-heap tier.
    pub heap_capacity: usize,

    /// Bytes mapped for the off-heap tier.
    pub off_heap_bytes: usize,

    /// Blocks the off-heap region is split into; eviction drops one block
    /// at a time.
    pub off_heap_blocks: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            heap_capacity: 1024,
            off_heap_bytes: 64 * 1024 * 1024, // 64 MB
            off_heap_blocks: 16,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the in-heap entry capacity.
    #[must_use]
    pub const fn heap_capacity(mut self, entries: usize) -> Self {
        self.heap_capacity = entries;
        self
    }

    /// Sets the off-heap region size.
    #[must_use]
    pub const fn off_heap_bytes(mut self, bytes: usize) -> Self {
        self.off_heap_bytes = bytes;
        self
    }

    /// Sets the off-heap block count.
    #[must_use]
    pub const fn off_heap_blocks(mut self, blocks: usize) -> Self {
        self.off_heap_blocks = blocks;
        self
    }

    /// Returns the size of one off-heap block.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.off_heap_bytes / self.off_heap_blocks.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_pattern() {
        let config = CacheConfig::new()
            .heap_capacity(10)
            .off_heap_bytes(4096)
            .off_heap_blocks(4);
        assert_eq!(config.heap_capacity, 10);
        assert_eq!(config.block_size(), 1024);
    }
}
