//! Error types for the cache tiers.

use std::io;
use thiserror::Error;

/// Result type for cache internals.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failures inside a cache tier.
///
/// The [`DocumentCache`](crate::DocumentCache) surface never returns these;
/// a failed put is reported as `false` and a failed get as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] bincode::Error),

    /// The off-heap region could not be mapped.
    #[error("memory map error: {0}")]
    Map(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_error_display() {
        let err = CacheError::from(io::Error::new(io::ErrorKind::OutOfMemory, "no room"));
        assert!(err.to_string().contains("no room"));
    }
}
