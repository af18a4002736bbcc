//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store backing one container.
///
/// Containers are written strictly at the end and never rewritten in place.
/// Once [`seal`](StorageBackend::seal) is called the backend is read-only.
///
/// # Invariants
///
/// - `append` returns the offset where the bytes start
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `sync` returns, every appended byte survives process termination
/// - a sealed backend rejects `append` and `truncate`
///
/// Implementations must be `Send + Sync`; callers share them behind locks.
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with [`ReadPastEnd`](crate::StorageError::ReadPastEnd) when the
    /// range is not fully inside the backend, or on I/O failure.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Fails when the backend is sealed or on I/O failure.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered bytes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the number of bytes held, which is also the next append offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops every byte after `new_size`.
    ///
    /// Only recovery uses this, to cut a torn tail left by an unclean shutdown.
    ///
    /// # Errors
    ///
    /// Fails when `new_size` exceeds the current size, when sealed, or on I/O
    /// failure.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Marks the backend read-only.
    fn seal(&mut self);

    /// Returns whether [`seal`](StorageBackend::seal) was called.
    fn is_sealed(&self) -> bool;
}
