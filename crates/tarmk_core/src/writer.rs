//! Segment writer: turns node states into records.

use crate::blob::BlobStore;
use crate::config::StoreConfig;
use crate::error::CoreResult;
use crate::node::{Blob, NodeState, PropertyValue};
use crate::segment::{NodeRecord, SegmentBuilder};
use crate::stats::WriterStats;
use crate::store::SegmentStore;
use crate::types::{Generation, RecordId};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Writes node states into segments tagged with one generation.
///
/// Children are written before their parent so every record refers only
/// to records that already have ids. Records accumulate in an open segment
/// that is handed to the store when it fills up or on [`flush`](Self::flush).
///
/// # Deduplication
///
/// - a segment-backed node already at the writer's generation is returned
///   as-is
/// - a record whose canonical bytes were written before returns the earlier
///   id; the hash cache is cleared when it reaches `dedup_cache_size`
pub struct SegmentWriter {
    store: Arc<dyn SegmentStore>,
    blobs: Arc<dyn BlobStore>,
    generation: Generation,
    max_segment_size: usize,
    max_segment_records: usize,
    inline_threshold: usize,
    dedup_capacity: usize,
    current: SegmentBuilder,
    dedup: HashMap<[u8; 32], RecordId>,
    stats: WriterStats,
}

impl SegmentWriter {
    /// Creates a writer producing segments of `generation`.
    pub fn new(
        store: Arc<dyn SegmentStore>,
        blobs: Arc<dyn BlobStore>,
        generation: Generation,
        config: &StoreConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            generation,
            max_segment_size: config.max_segment_size,
            max_segment_records: config.max_segment_records.max(1),
            inline_threshold: config.inline_threshold,
            dedup_capacity: config.dedup_cache_size.max(1),
            current: SegmentBuilder::new(generation),
            dedup: HashMap::new(),
            stats: WriterStats::default(),
        }
    }

    /// Returns the generation stamped on written segments.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns the writer's counters.
    #[must_use]
    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Returns the number of records waiting in the open segment.
    #[must_use]
    pub fn pending_records(&self) -> usize {
        self.current.len()
    }

    /// Writes `node` and its subtree, returning the node's record id.
    ///
    /// # Errors
    ///
    /// Returns an error if a source record cannot be read, a blob cannot be
    /// stored, or a full segment cannot be written.
    pub fn write_node(&mut self, node: &NodeState) -> CoreResult<RecordId> {
        if let (Some(id), Some(generation)) = (node.record_id(), node.generation()) {
            if generation == self.generation {
                self.stats.nodes_reused += 1;
                return Ok(id);
            }
        }

        let mut children = BTreeMap::new();
        for (name, child) in node.children()? {
            let id = self.write_node(&child)?;
            children.insert(name, id);
        }
        self.write_node_record(node.properties()?, children)
    }

    /// Writes one record whose children are already stored.
    ///
    /// Inline binaries longer than the inline threshold are moved to the
    /// blob store first.
    ///
    /// # Errors
    ///
    /// Returns an error if a blob cannot be stored or a full segment cannot
    /// be written.
    pub fn write_node_record(
        &mut self,
        properties: BTreeMap<String, PropertyValue>,
        children: BTreeMap<String, RecordId>,
    ) -> CoreResult<RecordId> {
        let mut record = NodeRecord {
            properties: BTreeMap::new(),
            children,
        };
        for (name, value) in properties {
            let value = self.externalize(value)?;
            record.properties.insert(name, value);
        }

        let bytes = record.encode();
        let hash: [u8; 32] = Sha256::digest(&bytes).into();
        if let Some(id) = self.dedup.get(&hash) {
            self.stats.records_deduplicated += 1;
            return Ok(*id);
        }

        if self
            .current
            .would_overflow(bytes.len(), self.max_segment_size, self.max_segment_records)
        {
            self.flush()?;
        }

        let number = self.current.add_record(&bytes, record.references());
        let id = RecordId::new(self.current.id(), number);
        self.stats.records_written += 1;

        if self.dedup.len() >= self.dedup_capacity {
            self.dedup.clear();
        }
        self.dedup.insert(hash, id);
        Ok(id)
    }

    fn externalize(&mut self, value: PropertyValue) -> CoreResult<PropertyValue> {
        match value {
            PropertyValue::Binary(Blob::Inline(data)) if data.len() > self.inline_threshold => {
                let id = self.blobs.put(&data)?;
                self.stats.blobs_externalized += 1;
                Ok(PropertyValue::Binary(Blob::External(id)))
            }
            PropertyValue::Multi(values) => values
                .into_iter()
                .map(|v| self.externalize(v))
                .collect::<CoreResult<Vec<_>>>()
                .map(PropertyValue::Multi),
            other => Ok(other),
        }
    }

    /// Hands the open segment to the store. A writer with no pending
    /// records does nothing.
    ///
    /// # Errors
    ///
    /// Returns the store's error. The pending records are lost and the
    /// dedup cache is cleared, so later writes never point into them.
    pub fn flush(&mut self) -> CoreResult<()> {
        if self.current.is_empty() {
            return Ok(());
        }

        let builder = std::mem::replace(&mut self.current, SegmentBuilder::new(self.generation));
        let records = builder.len();
        let (id, data, references) = builder.finish();
        let size = data.len();
        if let Err(e) = self.store.write(id, data, references) {
            self.dedup.clear();
            return Err(e);
        }

        self.stats.segments_flushed += 1;
        debug!(segment = %id, generation = self.generation, records, size, "segment flushed");
        Ok(())
    }
}

impl fmt::Debug for SegmentWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentWriter")
            .field("generation", &self.generation)
            .field("pending_records", &self.current.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
