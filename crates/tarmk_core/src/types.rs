//! Identifiers shared across the store.

use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Compaction epoch stamped on every segment.
pub type Generation = u32;

/// Identifier of an immutable segment.
///
/// Segment ids are random 128-bit UUIDs. They are never reused, so a reader
/// holding an id can always tell whether the segment is still present.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId([u8; 16]);

impl SegmentId {
    /// Creates a new random segment id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Creates a segment id from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Creates a segment id from a slice.
    ///
    /// Returns `None` if the slice is not exactly 16 bytes.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; 16]>::try_from(slice).ok().map(Self)
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({})", self.to_uuid())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

impl FromStr for SegmentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(|uuid| Self(uuid.into_bytes()))
    }
}

/// Address of one record inside a segment.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    segment: SegmentId,
    number: u32,
}

impl RecordId {
    /// Encoded width: segment id followed by a little-endian record number.
    pub const ENCODED_LEN: usize = 20;

    /// Creates a record id.
    #[must_use]
    pub const fn new(segment: SegmentId, number: u32) -> Self {
        Self { segment, number }
    }

    /// Returns the segment holding the record.
    #[must_use]
    pub const fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Returns the record's position inside its segment.
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// Encodes as 20 bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        out[..16].copy_from_slice(self.segment.as_bytes());
        out[16..].copy_from_slice(&self.number.to_le_bytes());
        out
    }

    /// Decodes from 20 bytes, or `None` on any other length.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != Self::ENCODED_LEN {
            return None;
        }
        let segment = SegmentId::from_slice(&slice[..16])?;
        let number = u32::from_le_bytes([slice[16], slice[17], slice[18], slice[19]]);
        Some(Self { segment, number })
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({self})")
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.number)
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (segment, number) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("missing record number in {s:?}"))?;
        let segment = segment
            .parse::<SegmentId>()
            .map_err(|e| format!("bad segment id in {s:?}: {e}"))?;
        let number = number
            .parse::<u32>()
            .map_err(|e| format!("bad record number in {s:?}: {e}"))?;
        Ok(Self::new(segment, number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_ids_are_unique() {
        assert_ne!(SegmentId::new(), SegmentId::new());
    }

    #[test]
    fn segment_id_from_slice_checks_length() {
        assert!(SegmentId::from_slice(&[0u8; 15]).is_none());
        assert_eq!(
            SegmentId::from_slice(&[7u8; 16]),
            Some(SegmentId::from_bytes([7u8; 16]))
        );
    }

    #[test]
    fn record_id_bytes() {
        let id = RecordId::new(SegmentId::new(), 0x0102_0304);
        let bytes = id.to_bytes();
        assert_eq!(&bytes[16..], &[4, 3, 2, 1]);
        assert_eq!(RecordId::from_slice(&bytes), Some(id));
        assert_eq!(RecordId::from_slice(&bytes[..19]), None);
    }

    #[test]
    fn record_id_display_parses_back() {
        let id = RecordId::new(SegmentId::new(), 42);
        let text = id.to_string();
        assert!(text.ends_with(":42"));
        assert_eq!(text.parse::<RecordId>().unwrap(), id);
        assert!("nonsense".parse::<RecordId>().is_err());
    }
}
