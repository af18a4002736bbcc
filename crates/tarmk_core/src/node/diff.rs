//! One-level comparison of two snapshots.

use super::{NodeState, PropertyValue};
use crate::error::CoreResult;
use std::collections::BTreeMap;

/// How one property differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyChange {
    /// Present only after.
    Added(PropertyValue),
    /// Present on both sides with different values.
    Changed {
        /// Value before.
        before: PropertyValue,
        /// Value after.
        after: PropertyValue,
    },
    /// Present only before.
    Deleted(PropertyValue),
}

/// Differences between two nodes, not descending into changed children.
///
/// Children are compared by identity only, so each subtree is walked at
/// most once by a caller that recurses into `changed_children`. A child
/// listed there can still turn out structurally equal one level down.
#[derive(Debug, Clone, Default)]
pub struct NodeDiff {
    /// Property changes by name.
    pub properties: BTreeMap<String, PropertyChange>,
    /// Children present only after.
    pub added_children: BTreeMap<String, NodeState>,
    /// Children present on both sides with different identities, as
    /// `(before, after)`.
    pub changed_children: BTreeMap<String, (NodeState, NodeState)>,
    /// Children present only before.
    pub deleted_children: BTreeMap<String, NodeState>,
}

impl NodeDiff {
    /// Returns true if nothing differs at this level and no child needs a
    /// closer look.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
            && self.added_children.is_empty()
            && self.changed_children.is_empty()
            && self.deleted_children.is_empty()
    }
}

/// Compares `before` and `after`.
///
/// # Errors
///
/// Returns an error if either side cannot be read.
pub fn diff_node(before: &NodeState, after: &NodeState) -> CoreResult<NodeDiff> {
    let mut diff = NodeDiff::default();
    if before.same_identity(after) {
        return Ok(diff);
    }

    let old_props = before.properties()?;
    let new_props = after.properties()?;
    for (name, old) in &old_props {
        match new_props.get(name) {
            None => {
                diff.properties
                    .insert(name.clone(), PropertyChange::Deleted(old.clone()));
            }
            Some(new) if new != old => {
                diff.properties.insert(
                    name.clone(),
                    PropertyChange::Changed {
                        before: old.clone(),
                        after: new.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }
    for (name, new) in new_props {
        if !old_props.contains_key(&name) {
            diff.properties.insert(name, PropertyChange::Added(new));
        }
    }

    let mut old_children: BTreeMap<String, NodeState> = before.children()?.into_iter().collect();
    for (name, new) in after.children()? {
        match old_children.remove(&name) {
            None => {
                diff.added_children.insert(name, new);
            }
            Some(old) => {
                if !old.same_identity(&new) {
                    diff.changed_children.insert(name, (old, new));
                }
            }
        }
    }
    diff.deleted_children = old_children;

    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBuilder;

    fn base() -> NodeState {
        let mut builder = NodeBuilder::new(NodeState::empty());
        builder.set_property("keep", "k").set_property("edit", 1i64);
        builder.set_property("drop", true);
        builder.add_child("same").set_property("x", 1i64);
        builder.add_child("touched").set_property("x", 1i64);
        builder.add_child("gone");
        builder.node_state().unwrap()
    }

    #[test]
    fn identical_nodes_have_empty_diff() {
        let base = base();
        assert!(diff_node(&base, &base).unwrap().is_empty());
        let unchanged = NodeBuilder::new(base.clone()).node_state().unwrap();
        assert!(diff_node(&base, &unchanged).unwrap().is_empty());
    }

    #[test]
    fn equal_copies_are_left_to_the_next_level() {
        let before = base();
        let copy = self::base();
        let diff = diff_node(&before, &copy).unwrap();
        assert!(diff.properties.is_empty());
        assert!(diff.added_children.is_empty());
        assert!(diff.deleted_children.is_empty());
        assert_eq!(
            diff.changed_children.keys().collect::<Vec<_>>(),
            vec!["gone", "same", "touched"]
        );
        for (old, new) in diff.changed_children.values() {
            assert!(diff_node(old, new).unwrap().is_empty());
        }
    }

    #[test]
    fn reports_each_kind_of_change() {
        let before = base();
        let mut builder = NodeBuilder::new(before.clone());
        builder.set_property("edit", 2i64).set_property("new", "n");
        builder.remove_property("drop").unwrap();
        builder
            .child_mut("touched")
            .unwrap()
            .unwrap()
            .set_property("x", 2i64);
        builder.remove_child("gone").unwrap();
        builder.add_child("fresh");
        let after = builder.node_state().unwrap();

        let diff = diff_node(&before, &after).unwrap();
        assert_eq!(
            diff.properties.get("edit"),
            Some(&PropertyChange::Changed {
                before: PropertyValue::Long(1),
                after: PropertyValue::Long(2),
            })
        );
        assert_eq!(
            diff.properties.get("new"),
            Some(&PropertyChange::Added("n".into()))
        );
        assert_eq!(
            diff.properties.get("drop"),
            Some(&PropertyChange::Deleted(true.into()))
        );
        assert!(!diff.properties.contains_key("keep"));
        assert_eq!(diff.added_children.keys().collect::<Vec<_>>(), vec!["fresh"]);
        assert_eq!(diff.changed_children.keys().collect::<Vec<_>>(), vec!["touched"]);
        assert_eq!(diff.deleted_children.keys().collect::<Vec<_>>(), vec!["gone"]);
    }
}
