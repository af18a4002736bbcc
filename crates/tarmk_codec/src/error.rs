//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while decoding record bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended in the middle of a value.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Bytes remained after the top-level value.
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes.
        remaining: usize,
    },

    /// A text string was not UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// The input is well-formed CBOR but not canonical, or uses a construct
    /// records never contain.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// Description of the problem.
        message: String,
    },

    /// A negative integer does not fit an `i64`.
    #[error("integer overflow")]
    IntegerOverflow,
}

impl CodecError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
