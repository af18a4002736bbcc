//! Mutable overlay over a snapshot.

use super::{NodeState, PropertyValue};
use crate::error::CoreResult;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

/// Records edits against a base [`NodeState`] without touching it.
///
/// Child builders are created lazily by [`child_mut`](Self::child_mut), so
/// editing one deep path only materializes the nodes along it.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    base: NodeState,
    properties: BTreeMap<String, Option<PropertyValue>>,
    children: BTreeMap<String, ChildEdit>,
    removed: BTreeSet<String>,
}

#[derive(Debug, Clone)]
struct ChildEdit {
    builder: NodeBuilder,
    // The child no longer derives from the base's child of that name.
    replaced: bool,
}

impl NodeBuilder {
    /// Creates a builder with no edits over `base`.
    #[must_use]
    pub fn new(base: NodeState) -> Self {
        Self {
            base,
            properties: BTreeMap::new(),
            children: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Returns the snapshot the edits apply to.
    #[must_use]
    pub fn base(&self) -> &NodeState {
        &self.base
    }

    /// Sets property `name`.
    pub fn set_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> &mut Self {
        self.properties.insert(name.into(), Some(value.into()));
        self
    }

    /// Removes property `name`, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the base cannot be read.
    pub fn remove_property(&mut self, name: &str) -> CoreResult<bool> {
        let existed = self.property(name)?.is_some();
        if existed {
            self.properties.insert(name.to_string(), None);
        }
        Ok(existed)
    }

    /// Returns property `name` as edited.
    ///
    /// # Errors
    ///
    /// Returns an error if the base cannot be read.
    pub fn property(&self, name: &str) -> CoreResult<Option<PropertyValue>> {
        match self.properties.get(name) {
            Some(edited) => Ok(edited.clone()),
            None => self.base.property(name),
        }
    }

    /// Adds an empty child `name`, replacing any existing child.
    pub fn add_child(&mut self, name: impl Into<String>) -> &mut NodeBuilder {
        self.set_child(name, NodeState::empty())
    }

    /// Sets child `name` to `state`, replacing any existing child.
    pub fn set_child(&mut self, name: impl Into<String>, state: NodeState) -> &mut NodeBuilder {
        let name = name.into();
        self.removed.remove(&name);
        let edit = ChildEdit {
            builder: NodeBuilder::new(state),
            replaced: true,
        };
        let slot = match self.children.entry(name) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(edit);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(edit),
        };
        &mut slot.builder
    }

    /// Removes child `name`, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the base cannot be read.
    pub fn remove_child(&mut self, name: &str) -> CoreResult<bool> {
        let existed = self.has_child(name)?;
        self.children.remove(name);
        if self.base.has_child(name)? {
            self.removed.insert(name.to_string());
        }
        Ok(existed)
    }

    /// Returns a builder for existing child `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base child cannot be read.
    pub fn child_mut(&mut self, name: &str) -> CoreResult<Option<&mut NodeBuilder>> {
        if self.removed.contains(name) {
            return Ok(None);
        }
        if !self.children.contains_key(name) {
            let Some(child) = self.base.child(name)? else {
                return Ok(None);
            };
            self.children.insert(
                name.to_string(),
                ChildEdit {
                    builder: NodeBuilder::new(child),
                    replaced: false,
                },
            );
        }
        Ok(self.children.get_mut(name).map(|edit| &mut edit.builder))
    }

    /// Returns whether child `name` exists after the edits.
    ///
    /// # Errors
    ///
    /// Returns an error if the base cannot be read.
    pub fn has_child(&self, name: &str) -> CoreResult<bool> {
        if self.children.contains_key(name) {
            Ok(true)
        } else if self.removed.contains(name) {
            Ok(false)
        } else {
            self.base.has_child(name)
        }
    }

    /// Returns the child names after the edits, ordered.
    ///
    /// # Errors
    ///
    /// Returns an error if the base cannot be read.
    pub fn child_names(&self) -> CoreResult<Vec<String>> {
        let mut names: BTreeSet<String> = self.base.child_names()?.into_iter().collect();
        names.retain(|name| !self.removed.contains(name));
        names.extend(self.children.keys().cloned());
        Ok(names.into_iter().collect())
    }

    /// Returns true if any edit was recorded in this subtree.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        !self.properties.is_empty()
            || !self.removed.is_empty()
            || self
                .children
                .values()
                .any(|edit| edit.replaced || edit.builder.is_modified())
    }

    /// Produces the edited snapshot. An unmodified builder returns its base.
    ///
    /// # Errors
    ///
    /// Returns an error if the base cannot be read.
    pub fn node_state(&self) -> CoreResult<NodeState> {
        if !self.is_modified() {
            return Ok(self.base.clone());
        }

        let mut properties = self.base.properties()?;
        for (name, edit) in &self.properties {
            match edit {
                Some(value) => properties.insert(name.clone(), value.clone()),
                None => properties.remove(name),
            };
        }

        let mut children: BTreeMap<String, NodeState> = self.base.children()?.into_iter().collect();
        for name in &self.removed {
            children.remove(name);
        }
        for (name, edit) in &self.children {
            children.insert(name.clone(), edit.builder.node_state()?);
        }

        Ok(NodeState::new(properties, children))
    }
}
