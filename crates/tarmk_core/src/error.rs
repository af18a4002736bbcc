//! Error types for tarmk core.

use crate::types::{RecordId, SegmentId};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in tarmk core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] tarmk_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] tarmk_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A segment id is not present in the store.
    #[error("segment not found: {id}")]
    SegmentNotFound {
        /// The missing segment.
        id: SegmentId,
    },

    /// A segment id was written twice.
    #[error("segment already exists: {id}")]
    SegmentExists {
        /// The duplicate segment.
        id: SegmentId,
    },

    /// A record number is out of range for its segment.
    #[error("record not found: {id}")]
    RecordNotFound {
        /// The missing record.
        id: RecordId,
    },

    /// A journal name is unknown.
    #[error("journal not found: {name}")]
    JournalNotFound {
        /// The journal name.
        name: String,
    },

    /// A blob id is unknown to the blob store.
    #[error("blob not found: {id}")]
    BlobNotFound {
        /// The content id.
        id: String,
    },

    /// A merge could not be reconciled with concurrent commits.
    #[error("merge conflict at {path} after {attempts} attempt(s)")]
    MergeConflict {
        /// Path of the first conflicting item.
        path: String,
        /// Merge attempts made before giving up.
        attempts: u32,
    },

    /// A commit hook rejected the change.
    #[error("commit failed: {message}")]
    CommitFailed {
        /// Reason given by the hook.
        message: String,
    },

    /// Segment bytes on disk are damaged.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Data does not follow the segment or record layout.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// An earlier write failed; the store refuses changes until reopened.
    #[error("store failed and must be reopened: {message}")]
    StoreFailed {
        /// The error that first failed the store.
        message: String,
    },
}

impl CoreError {
    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a commit failed error.
    pub fn commit_failed(message: impl Into<String>) -> Self {
        Self::CommitFailed {
            message: message.into(),
        }
    }

    /// Creates a merge conflict error.
    pub fn merge_conflict(path: impl Into<String>, attempts: u32) -> Self {
        Self::MergeConflict {
            path: path.into(),
            attempts,
        }
    }

    /// Returns true for errors that mean "absent" rather than "broken".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SegmentNotFound { .. }
                | Self::RecordNotFound { .. }
                | Self::JournalNotFound { .. }
                | Self::BlobNotFound { .. }
        )
    }
}
