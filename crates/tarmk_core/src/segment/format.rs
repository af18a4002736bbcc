//! Segment data layout.

use crate::error::{CoreError, CoreResult};
use crate::types::{Generation, RecordId, SegmentId};
use bytes::Bytes;

/// Magic bytes opening every segment.
pub const SEGMENT_MAGIC: [u8; 4] = *b"TMKS";

/// Current segment format version.
pub const SEGMENT_VERSION: u8 = 1;

/// magic (4) + version (1) + generation (4) + record count (4)
const HEADER_SIZE: usize = 13;

/// A parsed, immutable segment.
///
/// Cloning is cheap: the data is reference counted.
#[derive(Debug, Clone)]
pub struct Segment {
    id: SegmentId,
    generation: Generation,
    data: Bytes,
    references: Vec<SegmentId>,
    /// Absolute start of each record inside `data`.
    starts: Vec<usize>,
}

impl Segment {
    /// Parses segment data and validates its header and offset table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the magic, version or offset table is
    /// malformed.
    pub fn parse(id: SegmentId, data: Bytes, references: Vec<SegmentId>) -> CoreResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(CoreError::invalid_format(format!(
                "segment {id} is {} bytes, shorter than its header",
                data.len()
            )));
        }
        if data[..4] != SEGMENT_MAGIC {
            return Err(CoreError::invalid_format(format!("segment {id} has bad magic")));
        }
        if data[4] != SEGMENT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "segment {id} has unsupported version {}",
                data[4]
            )));
        }
        let generation = read_u32(&data, 5);
        let count = read_u32(&data, 9) as usize;

        let table_end = count
            .checked_mul(4)
            .and_then(|n| n.checked_add(HEADER_SIZE))
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                CoreError::invalid_format(format!("segment {id} offset table overruns data"))
            })?;

        let mut starts = Vec::with_capacity(count);
        let mut previous = 0usize;
        for i in 0..count {
            let relative = read_u32(&data, HEADER_SIZE + i * 4) as usize;
            let start = table_end + relative;
            if relative < previous || start > data.len() {
                return Err(CoreError::invalid_format(format!(
                    "segment {id} record {i} offset {relative} out of order or out of range"
                )));
            }
            previous = relative;
            starts.push(start);
        }

        if references.contains(&id) {
            return Err(CoreError::invalid_format(format!(
                "segment {id} references itself"
            )));
        }

        Ok(Self {
            id,
            generation,
            data,
            references,
            starts,
        })
    }

    /// Returns the segment id.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Returns the generation the segment was written in.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns the raw data, exactly as written.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns the ids of the other segments this one points into.
    #[must_use]
    pub fn references(&self) -> &[SegmentId] {
        &self.references
    }

    /// Returns the number of records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.starts.len()
    }

    /// Returns the bytes of record `number`.
    ///
    /// # Errors
    ///
    /// Returns `RecordNotFound` if `number` is out of range.
    pub fn record(&self, number: u32) -> CoreResult<&[u8]> {
        let index = number as usize;
        let start = *self.starts.get(index).ok_or(CoreError::RecordNotFound {
            id: RecordId::new(self.id, number),
        })?;
        let end = self.starts.get(index + 1).copied().unwrap_or(self.data.len());
        Ok(&self.data[start..end])
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Accumulates records for one segment before it is written.
#[derive(Debug)]
pub struct SegmentBuilder {
    id: SegmentId,
    generation: Generation,
    records: Vec<u8>,
    offsets: Vec<u32>,
    references: Vec<SegmentId>,
}

impl SegmentBuilder {
    /// Starts an empty segment with a fresh id.
    #[must_use]
    pub fn new(generation: Generation) -> Self {
        Self::with_id(SegmentId::new(), generation)
    }

    /// Starts an empty segment with the given id.
    #[must_use]
    pub fn with_id(id: SegmentId, generation: Generation) -> Self {
        Self {
            id,
            generation,
            records: Vec::new(),
            offsets: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Returns the id the segment will be written under.
    #[must_use]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Returns the number of records added.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns true if no record was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Returns the size the finished data would have.
    #[must_use]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.offsets.len() * 4 + self.records.len()
    }

    /// Returns true if adding a record of `len` bytes would break either
    /// limit. An empty builder always accepts one record.
    #[must_use]
    pub fn would_overflow(&self, len: usize, max_size: usize, max_records: usize) -> bool {
        !self.is_empty() && (self.size() + 4 + len > max_size || self.len() >= max_records)
    }

    /// Appends a record and returns its number.
    ///
    /// `references` are the segments the record points into; the builder
    /// keeps each foreign id once, in first-seen order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_record(
        &mut self,
        record: &[u8],
        references: impl IntoIterator<Item = SegmentId>,
    ) -> u32 {
        let number = self.offsets.len() as u32;
        self.offsets.push(self.records.len() as u32);
        self.records.extend_from_slice(record);
        for reference in references {
            if reference != self.id && !self.references.contains(&reference) {
                self.references.push(reference);
            }
        }
        number
    }

    /// Serializes the segment, returning `(id, data, references)`.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn finish(self) -> (SegmentId, Bytes, Vec<SegmentId>) {
        let mut data = Vec::with_capacity(self.size());
        data.extend_from_slice(&SEGMENT_MAGIC);
        data.push(SEGMENT_VERSION);
        data.extend_from_slice(&self.generation.to_le_bytes());
        data.extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());
        for offset in &self.offsets {
            data.extend_from_slice(&offset.to_le_bytes());
        }
        data.extend_from_slice(&self.records);
        (self.id, Bytes::from(data), self.references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    fn build(records: &[&[u8]]) -> Segment {
        let mut builder = SegmentBuilder::new(3);
        for record in records {
            builder.add_record(record, []);
        }
        let (id, data, refs) = builder.finish();
        Segment::parse(id, data, refs).unwrap()
    }

    #[test]
    fn records_read_back() {
        let segment = build(&[b"one", b"", b"three"]);
        assert_eq!(segment.generation(), 3);
        assert_eq!(segment.record_count(), 3);
        assert_eq!(segment.record(0).unwrap(), b"one");
        assert_eq!(segment.record(1).unwrap(), b"");
        assert_eq!(segment.record(2).unwrap(), b"three");
        assert!(matches!(
            segment.record(3),
            Err(CoreError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn empty_segment_is_valid() {
        let segment = build(&[]);
        assert_eq!(segment.record_count(), 0);
        assert_eq!(segment.data().len(), HEADER_SIZE);
    }

    #[test]
    fn builder_dedups_references_and_skips_self() {
        let other = SegmentId::new();
        let mut builder = SegmentBuilder::new(0);
        let own = builder.id();
        builder.add_record(b"a", [other, own]);
        builder.add_record(b"b", [other]);
        let (_, _, refs) = builder.finish();
        assert_eq!(refs, vec![other]);
    }

    #[test]
    fn overflow_rules() {
        let mut builder = SegmentBuilder::new(0);
        assert!(!builder.would_overflow(1_000_000, 10, 1));
        builder.add_record(b"xyz", []);
        assert!(builder.would_overflow(1, 1024, 1));
        assert!(builder.would_overflow(1024, 1024, 10));
        assert!(!builder.would_overflow(8, 1024, 10));
    }

    #[test]
    fn parse_rejects_garbage() {
        let id = SegmentId::new();
        assert!(Segment::parse(id, Bytes::from_static(b"TMK"), vec![]).is_err());
        assert!(Segment::parse(id, Bytes::from_static(b"XXXX\x01\0\0\0\0\0\0\0\0"), vec![]).is_err());
        // Claims one record but has no offset table.
        assert!(Segment::parse(id, Bytes::from_static(b"TMKS\x01\0\0\0\0\x01\0\0\0"), vec![]).is_err());
    }

    #[test]
    fn parse_rejects_self_reference() {
        let (id, data, _) = SegmentBuilder::new(0).finish();
        assert!(Segment::parse(id, data, vec![id]).is_err());
    }

    proptest! {
        #[test]
        fn built_records_read_back(records in vec(vec(any::<u8>(), 0..48), 0..24)) {
            let mut builder = SegmentBuilder::new(2);
            for record in &records {
                builder.add_record(record, []);
            }
            let (id, data, refs) = builder.finish();
            let segment = Segment::parse(id, data, refs).unwrap();
            prop_assert_eq!(segment.record_count(), records.len());
            for (number, record) in records.iter().enumerate() {
                prop_assert_eq!(segment.record(number as u32).unwrap(), &record[..]);
            }
        }

        #[test]
        fn damaged_header_is_rejected_not_panicked(tail in vec(any::<u8>(), 0..96)) {
            let mut data = b"TMKS\x01".to_vec();
            data.extend_from_slice(&tail);
            if let Ok(segment) = Segment::parse(SegmentId::new(), Bytes::from(data), vec![]) {
                for number in 0..segment.record_count() as u32 {
                    prop_assert!(segment.record(number).is_ok());
                }
            }
        }
    }
}
