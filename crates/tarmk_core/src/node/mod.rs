//! Immutable tree snapshots.
//!
//! A [`NodeState`] is either built in memory (by a [`NodeBuilder`] or a
//! test) or backed by a record in a stored segment, decoded on first use.
//! Both forms share structure through `Arc`, so cloning is cheap and
//! unchanged subtrees are never copied.

mod builder;
mod diff;
mod property;

pub use builder::NodeBuilder;
pub use diff::{diff_node, NodeDiff, PropertyChange};
pub use property::{Blob, PropertyValue};

use crate::error::CoreResult;
use crate::gc::LeaseGuard;
use crate::segment::{NodeRecord, Segment, SegmentReader};
use crate::types::{Generation, RecordId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// An immutable node and its subtree at one point in time.
///
/// Equality is structural: see [`equals`](Self::equals).
#[derive(Clone)]
pub struct NodeState(Arc<NodeInner>);

enum NodeInner {
    Memory {
        properties: BTreeMap<String, PropertyValue>,
        children: BTreeMap<String, NodeState>,
    },
    Stored {
        reader: Arc<SegmentReader>,
        id: RecordId,
        segment: Arc<Segment>,
        record: OnceLock<NodeRecord>,
        /// Lease keeping this node's segments from reclamation. Children
        /// loaded through this node share it.
        pin: Option<Arc<LeaseGuard>>,
    },
}

impl NodeState {
    /// Returns a node with no properties and no children.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(BTreeMap::new(), BTreeMap::new())
    }

    /// Creates an in-memory node.
    #[must_use]
    pub fn new(
        properties: BTreeMap<String, PropertyValue>,
        children: BTreeMap<String, NodeState>,
    ) -> Self {
        Self(Arc::new(NodeInner::Memory {
            properties,
            children,
        }))
    }

    /// Returns a node backed by stored record `id`.
    ///
    /// The segment is read now; the record is decoded on first access.
    ///
    /// # Errors
    ///
    /// Returns `SegmentNotFound` or `RecordNotFound` if `id` does not
    /// resolve.
    pub fn load(reader: &Arc<SegmentReader>, id: RecordId) -> CoreResult<Self> {
        Self::load_pinned(reader, id, None)
    }

    fn load_pinned(
        reader: &Arc<SegmentReader>,
        id: RecordId,
        pin: Option<Arc<LeaseGuard>>,
    ) -> CoreResult<Self> {
        let segment = reader.segment(id.segment())?;
        segment.record(id.number())?;
        Ok(Self(Arc::new(NodeInner::Stored {
            reader: Arc::clone(reader),
            id,
            segment,
            record: OnceLock::new(),
            pin,
        })))
    }

    /// Returns a handle on the same node that keeps `guard` alive, and
    /// hands it on to every child loaded through it. In-memory nodes are
    /// returned as they are.
    pub(crate) fn pinned(&self, guard: &Arc<LeaseGuard>) -> Self {
        match &*self.0 {
            NodeInner::Memory { .. } => self.clone(),
            NodeInner::Stored {
                reader,
                id,
                segment,
                record,
                ..
            } => Self(Arc::new(NodeInner::Stored {
                reader: Arc::clone(reader),
                id: *id,
                segment: Arc::clone(segment),
                record: record.clone(),
                pin: Some(Arc::clone(guard)),
            })),
        }
    }

    /// Returns the record this node was loaded from, if stored.
    #[must_use]
    pub fn record_id(&self) -> Option<RecordId> {
        match &*self.0 {
            NodeInner::Memory { .. } => None,
            NodeInner::Stored { id, .. } => Some(*id),
        }
    }

    /// Returns the generation of the backing segment, if stored.
    #[must_use]
    pub fn generation(&self) -> Option<Generation> {
        match &*self.0 {
            NodeInner::Memory { .. } => None,
            NodeInner::Stored { segment, .. } => Some(segment.generation()),
        }
    }

    /// Returns true if both handles denote the same node without looking
    /// inside: the same allocation or the same stored record.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || matches!((self.record_id(), other.record_id()), (Some(a), Some(b)) if a == b)
    }

    fn record(&self) -> CoreResult<Option<&NodeRecord>> {
        let NodeInner::Stored {
            id,
            segment,
            record,
            ..
        } = &*self.0
        else {
            return Ok(None);
        };
        if let Some(decoded) = record.get() {
            return Ok(Some(decoded));
        }
        let decoded = NodeRecord::decode(segment.record(id.number())?)?;
        // A concurrent decode may have won; both results are identical.
        let _ = record.set(decoded);
        Ok(record.get())
    }

    /// Returns property `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing record cannot be decoded.
    pub fn property(&self, name: &str) -> CoreResult<Option<PropertyValue>> {
        Ok(match &*self.0 {
            NodeInner::Memory { properties, .. } => properties.get(name).cloned(),
            NodeInner::Stored { .. } => self
                .record()?
                .and_then(|r| r.properties.get(name).cloned()),
        })
    }

    /// Returns all properties, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing record cannot be decoded.
    pub fn properties(&self) -> CoreResult<BTreeMap<String, PropertyValue>> {
        Ok(match &*self.0 {
            NodeInner::Memory { properties, .. } => properties.clone(),
            NodeInner::Stored { .. } => self
                .record()?
                .map(|r| r.properties.clone())
                .unwrap_or_default(),
        })
    }

    /// Returns whether child `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing record cannot be decoded.
    pub fn has_child(&self, name: &str) -> CoreResult<bool> {
        Ok(match &*self.0 {
            NodeInner::Memory { children, .. } => children.contains_key(name),
            NodeInner::Stored { .. } => self
                .record()?
                .is_some_and(|r| r.children.contains_key(name)),
        })
    }

    /// Returns child `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the child's segment cannot be read.
    pub fn child(&self, name: &str) -> CoreResult<Option<NodeState>> {
        match &*self.0 {
            NodeInner::Memory { children, .. } => Ok(children.get(name).cloned()),
            NodeInner::Stored { reader, pin, .. } => {
                match self.record()?.and_then(|r| r.children.get(name).copied()) {
                    Some(id) => Ok(Some(NodeState::load_pinned(reader, id, pin.clone())?)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Returns the child names, ordered.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing record cannot be decoded.
    pub fn child_names(&self) -> CoreResult<Vec<String>> {
        Ok(match &*self.0 {
            NodeInner::Memory { children, .. } => children.keys().cloned().collect(),
            NodeInner::Stored { .. } => self
                .record()?
                .map(|r| r.children.keys().cloned().collect())
                .unwrap_or_default(),
        })
    }

    /// Returns the number of children.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing record cannot be decoded.
    pub fn child_count(&self) -> CoreResult<usize> {
        Ok(match &*self.0 {
            NodeInner::Memory { children, .. } => children.len(),
            NodeInner::Stored { .. } => self.record()?.map_or(0, |r| r.children.len()),
        })
    }

    /// Returns all children, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if a child's segment cannot be read.
    pub fn children(&self) -> CoreResult<Vec<(String, NodeState)>> {
        match &*self.0 {
            NodeInner::Memory { children, .. } => Ok(children
                .iter()
                .map(|(name, child)| (name.clone(), child.clone()))
                .collect()),
            NodeInner::Stored { reader, pin, .. } => {
                let Some(record) = self.record()? else {
                    return Ok(Vec::new());
                };
                record
                    .children
                    .iter()
                    .map(|(name, id)| {
                        Ok((name.clone(), NodeState::load_pinned(reader, *id, pin.clone())?))
                    })
                    .collect()
            }
        }
    }

    /// Compares two subtrees structurally.
    ///
    /// Nodes with the same identity are equal without being walked, so
    /// comparing two stored trees only descends where they differ.
    ///
    /// # Errors
    ///
    /// Returns an error if a record on either side cannot be read.
    pub fn equals(&self, other: &Self) -> CoreResult<bool> {
        if self.same_identity(other) {
            return Ok(true);
        }
        if self.properties()? != other.properties()? {
            return Ok(false);
        }
        if self.child_names()? != other.child_names()? {
            return Ok(false);
        }
        for ((_, mine), (_, theirs)) in self.children()?.iter().zip(other.children()?.iter()) {
            if !mine.equals(theirs)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns the number of nodes in the subtree, this one included.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be read.
    pub fn count_nodes(&self) -> CoreResult<u64> {
        let mut total = 1;
        for (_, child) in self.children()? {
            total += child.count_nodes()?;
        }
        Ok(total)
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            NodeInner::Memory {
                properties,
                children,
            } => f
                .debug_struct("NodeState")
                .field("properties", properties)
                .field("children", &children.keys().collect::<Vec<_>>())
                .finish(),
            NodeInner::Stored { id, segment, .. } => f
                .debug_struct("NodeState")
                .field("record", id)
                .field("generation", &segment.generation())
                .finish(),
        }
    }
}
