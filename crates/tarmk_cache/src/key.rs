//! Cache keys.

use sha2::{Digest, Sha256};
use std::fmt;

/// Truncated SHA-256 of a document version.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Fingerprints `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Self(out)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint(")?;
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "..)")
    }
}

/// Identifies one version of one document.
///
/// The `id` names the document; the fingerprint names its version. A
/// lookup hits only when both match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Logical document id.
    pub id: String,
    /// Version fingerprint.
    pub fingerprint: Fingerprint,
}

impl CacheKey {
    /// Creates a key.
    pub fn new(id: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            id: id.into(),
            fingerprint,
        }
    }

    /// Creates a key fingerprinting `version`.
    pub fn for_version(id: impl Into<String>, version: &[u8]) -> Self {
        Self::new(id, Fingerprint::of(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(Fingerprint::of(b"v1"), Fingerprint::of(b"v1"));
        assert_ne!(Fingerprint::of(b"v1"), Fingerprint::of(b"v2"));
    }

    #[test]
    fn keys_differ_by_version() {
        let a = CacheKey::for_version("/content/a", b"r1");
        let b = CacheKey::for_version("/content/a", b"r2");
        assert_eq!(a.id, b.id);
        assert_ne!(a, b);
    }
}
