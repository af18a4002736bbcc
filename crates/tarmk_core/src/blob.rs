//! Content-addressed storage for large binary values.
//!
//! Binary properties above the writer's inline threshold are stored here and
//! referenced from records by [`BlobId`]. Ids are the SHA-256 of the content,
//! so storing the same bytes twice is a no-op.

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Content id of a blob: lowercase hex SHA-256.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId(String);

impl BlobId {
    /// Computes the id of `data`.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Validates and wraps an id string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` unless `id` is 64 lowercase hex characters.
    pub fn parse(id: &str) -> CoreResult<Self> {
        let valid = id.len() == 64
            && id
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(id.to_string()))
        } else {
            Err(CoreError::invalid_format(format!("not a blob id: {id:?}")))
        }
    }

    /// Returns the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", &self.0[..12])
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A content-addressed blob store.
pub trait BlobStore: Send + Sync {
    /// Stores `data` and returns its content id. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be persisted.
    fn put(&self, data: &[u8]) -> CoreResult<BlobId>;

    /// Returns the content of blob `id`.
    ///
    /// # Errors
    ///
    /// Returns `BlobNotFound` if the blob is absent, or an I/O error.
    fn get(&self, id: &BlobId) -> CoreResult<Vec<u8>>;

    /// Returns whether blob `id` is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn contains(&self, id: &BlobId) -> CoreResult<bool>;
}

/// Blob store held in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Arc<[u8]>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of distinct blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if no blob is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, data: &[u8]) -> CoreResult<BlobId> {
        let id = BlobId::of(data);
        self.blobs
            .write()
            .entry(id.clone())
            .or_insert_with(|| Arc::from(data));
        Ok(id)
    }

    fn get(&self, id: &BlobId) -> CoreResult<Vec<u8>> {
        self.blobs
            .read()
            .get(id)
            .map(|data| data.to_vec())
            .ok_or_else(|| CoreError::BlobNotFound { id: id.to_string() })
    }

    fn contains(&self, id: &BlobId) -> CoreResult<bool> {
        Ok(self.blobs.read().contains_key(id))
    }
}

/// Blob store in a directory, one file per blob.
///
/// ```text
/// <root>/ab/cd/abcd...   # fanned out by the first two hex pairs
/// ```
///
/// Blobs are written to a temporary sibling and renamed into place, so a
/// crash never leaves a partial blob under its final name.
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Opens a blob directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> CoreResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, id: &BlobId) -> PathBuf {
        let hex = id.as_str();
        self.root.join(&hex[..2]).join(&hex[2..4]).join(hex)
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, data: &[u8]) -> CoreResult<BlobId> {
        let id = BlobId::of(data);
        let path = self.blob_path(&id);
        if path.exists() {
            return Ok(id);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let written = File::create(&temp).and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&temp, &path)) {
            let _ = fs::remove_file(&temp);
            // Another writer may have renamed the same content into place.
            if !path.exists() {
                return Err(e.into());
            }
        }
        Ok(id)
    }

    fn get(&self, id: &BlobId) -> CoreResult<Vec<u8>> {
        match fs::read(self.blob_path(id)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::BlobNotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, id: &BlobId) -> CoreResult<bool> {
        Ok(self.blob_path(id).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn blob_id_is_sha256_hex() {
        let id = BlobId::of(b"abc");
        assert_eq!(
            id.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(BlobId::parse(id.as_str()).unwrap(), id);
        assert!(BlobId::parse("ABC").is_err());
    }

    #[test]
    fn memory_put_is_idempotent() {
        let store = MemoryBlobStore::new();
        let a = store.put(b"payload").unwrap();
        let b = store.put(b"payload").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&a).unwrap(), b"payload");
    }

    #[test]
    fn memory_get_missing() {
        let store = MemoryBlobStore::new();
        let id = BlobId::of(b"missing");
        assert!(!store.contains(&id).unwrap());
        assert!(matches!(store.get(&id), Err(CoreError::BlobNotFound { .. })));
    }

    #[test]
    fn file_store_fans_out_and_persists() {
        let dir = tempdir().unwrap();
        let id = {
            let store = FileBlobStore::open(dir.path()).unwrap();
            let id = store.put(&[5u8; 10_000]).unwrap();
            assert_eq!(store.put(&[5u8; 10_000]).unwrap(), id);
            id
        };

        let hex = id.as_str();
        assert!(dir.path().join(&hex[..2]).join(&hex[2..4]).join(hex).is_file());

        let reopened = FileBlobStore::open(dir.path()).unwrap();
        assert!(reopened.contains(&id).unwrap());
        assert_eq!(reopened.get(&id).unwrap(), vec![5u8; 10_000]);
        assert!(matches!(
            reopened.get(&BlobId::of(b"other")),
            Err(CoreError::BlobNotFound { .. })
        ));
    }
}
