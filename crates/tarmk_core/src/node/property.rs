//! Property values.

use crate::blob::{BlobId, BlobStore};
use crate::error::CoreResult;
use std::fmt;

/// Binary property content, either held inline or stored in a blob store.
///
/// Two blobs are equal when their content ids are equal, regardless of
/// where the bytes live.
#[derive(Clone)]
pub enum Blob {
    /// Bytes carried in the record.
    Inline(Vec<u8>),
    /// Bytes held by a [`BlobStore`].
    External(BlobId),
}

impl Blob {
    /// Returns the content id, hashing inline bytes when needed.
    #[must_use]
    pub fn content_id(&self) -> BlobId {
        match self {
            Self::Inline(data) => BlobId::of(data),
            Self::External(id) => id.clone(),
        }
    }

    /// Returns the bytes, fetching external content from `blobs`.
    ///
    /// # Errors
    ///
    /// Returns `BlobNotFound` if an external blob is missing.
    pub fn load(&self, blobs: &dyn BlobStore) -> CoreResult<Vec<u8>> {
        match self {
            Self::Inline(data) => Ok(data.clone()),
            Self::External(id) => blobs.get(id),
        }
    }

    /// Returns true if the content is held inline.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Inline(a), Self::Inline(b)) => a == b,
            (Self::External(a), Self::External(b)) => a == b,
            _ => self.content_id() == other.content_id(),
        }
    }
}

impl Eq for Blob {}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(data) => write!(f, "Inline({} bytes)", data.len()),
            Self::External(id) => write!(f, "External({id:?})"),
        }
    }
}

/// Value of a node property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// UTF-8 text.
    String(String),
    /// Signed 64-bit integer.
    Long(i64),
    /// Boolean.
    Boolean(bool),
    /// Binary content.
    Binary(Blob),
    /// Ordered list of single values.
    Multi(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Wraps bytes as an inline binary value.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::Binary(Blob::Inline(data.into()))
    }

    /// Returns the text, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is a long.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the flag, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the blob, if this is binary.
    #[must_use]
    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Binary(blob) => Some(blob),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;

    #[test]
    fn blob_equality_is_by_content() {
        let inline = Blob::Inline(b"same".to_vec());
        let external = Blob::External(BlobId::of(b"same"));
        assert_eq!(inline, external);
        assert_ne!(inline, Blob::Inline(b"other".to_vec()));
    }

    #[test]
    fn external_blob_loads_from_store() {
        let store = MemoryBlobStore::new();
        let id = store.put(b"large content").unwrap();
        let blob = Blob::External(id);
        assert!(!blob.is_inline());
        assert_eq!(blob.load(&store).unwrap(), b"large content");
    }

    #[test]
    fn accessors() {
        assert_eq!(PropertyValue::from("x").as_str(), Some("x"));
        assert_eq!(PropertyValue::from(3i64).as_long(), Some(3));
        assert_eq!(PropertyValue::from(true).as_bool(), Some(true));
        assert!(PropertyValue::binary(vec![1, 2]).as_blob().is_some());
        assert_eq!(PropertyValue::from(3i64).as_str(), None);
    }
}
