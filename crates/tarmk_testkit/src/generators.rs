//! Property-based test generators.
//!
//! Proptest strategies for property values, node trees and branch edits.

use proptest::prelude::*;
use std::collections::BTreeMap;
use tarmk_core::{NodeBuilder, NodeState, PropertyValue};

/// Strategy for node and property names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

/// Strategy for single-valued properties.
pub fn scalar_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        "[ -~]{0,32}".prop_map(PropertyValue::String),
        any::<i64>().prop_map(PropertyValue::Long),
        any::<bool>().prop_map(PropertyValue::Boolean),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(|data| PropertyValue::binary(data)),
    ]
}

/// Strategy for property values, including multi-valued ones.
pub fn property_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        4 => scalar_value_strategy(),
        1 => prop::collection::vec(scalar_value_strategy(), 0..4).prop_map(PropertyValue::Multi),
    ]
}

/// Strategy for a property map.
pub fn properties_strategy(max: usize) -> impl Strategy<Value = BTreeMap<String, PropertyValue>> {
    prop::collection::btree_map(name_strategy(), property_value_strategy(), 0..=max)
}

/// A generated in-memory tree, before it is turned into a [`NodeState`].
#[derive(Debug, Clone)]
pub struct GeneratedTree {
    /// Properties of this node.
    pub properties: BTreeMap<String, PropertyValue>,
    /// Children by name.
    pub children: BTreeMap<String, GeneratedTree>,
}

impl GeneratedTree {
    /// Builds the node state for this tree.
    pub fn to_node_state(&self) -> NodeState {
        let children = self
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.to_node_state()))
            .collect();
        NodeState::new(self.properties.clone(), children)
    }

    /// Returns the number of nodes, this one included.
    pub fn node_count(&self) -> u64 {
        1 + self.children.values().map(GeneratedTree::node_count).sum::<u64>()
    }
}

/// Strategy for trees of at most `depth` levels below the root.
pub fn tree_strategy(depth: u32) -> impl Strategy<Value = GeneratedTree> {
    let leaf = properties_strategy(4).prop_map(|properties| GeneratedTree {
        properties,
        children: BTreeMap::new(),
    });
    leaf.prop_recursive(depth, 64, 4, |inner| {
        (
            properties_strategy(4),
            prop::collection::btree_map(name_strategy(), inner, 0..4),
        )
            .prop_map(|(properties, children)| GeneratedTree {
                properties,
                children,
            })
    })
}

/// Strategy for node states of at most `depth` levels.
pub fn node_state_strategy(depth: u32) -> impl Strategy<Value = NodeState> {
    tree_strategy(depth).prop_map(|tree| tree.to_node_state())
}

/// An edit applied to a branch.
#[derive(Debug, Clone)]
pub enum EditOperation {
    /// Set a property on a top-level child, creating the child if needed.
    SetProperty {
        /// Child name.
        child: String,
        /// Property name.
        name: String,
        /// New value.
        value: PropertyValue,
    },
    /// Remove a property from a top-level child.
    RemoveProperty {
        /// Child name.
        child: String,
        /// Property name.
        name: String,
    },
    /// Add (or replace) a top-level child.
    AddChild {
        /// Child name.
        child: String,
    },
    /// Remove a top-level child.
    RemoveChild {
        /// Child name.
        child: String,
    },
}

impl EditOperation {
    /// Applies the edit to `root`.
    ///
    /// # Panics
    ///
    /// Panics if the builder's base cannot be read.
    pub fn apply(&self, root: &mut NodeBuilder) {
        match self {
            Self::SetProperty { child, name, value } => {
                let exists = root.has_child(child).expect("read");
                let node = if exists {
                    root.child_mut(child).expect("read").expect("child exists")
                } else {
                    root.add_child(child.as_str())
                };
                node.set_property(name.as_str(), value.clone());
            }
            Self::RemoveProperty { child, name } => {
                if let Some(node) = root.child_mut(child).expect("read") {
                    node.remove_property(name).expect("read");
                }
            }
            Self::AddChild { child } => {
                root.add_child(child.as_str());
            }
            Self::RemoveChild { child } => {
                root.remove_child(child).expect("read");
            }
        }
    }
}

/// Strategy for one edit over a small set of child names.
pub fn edit_strategy() -> impl Strategy<Value = EditOperation> {
    let child = "[a-d]";
    let property = "[p-s]";
    prop_oneof![
        4 => (child, property, scalar_value_strategy()).prop_map(|(child, name, value)| {
            EditOperation::SetProperty { child, name, value }
        }),
        1 => (child, property).prop_map(|(child, name)| EditOperation::RemoveProperty { child, name }),
        1 => child.prop_map(|child| EditOperation::AddChild { child }),
        1 => child.prop_map(|child| EditOperation::RemoveChild { child }),
    ]
}

/// Strategy for a sequence of edits.
pub fn edits_strategy(max_len: usize) -> impl Strategy<Value = Vec<EditOperation>> {
    prop::collection::vec(edit_strategy(), 1..=max_len)
}

/// Configuration for property tests.
pub struct PropTestConfig;

impl PropTestConfig {
    /// Few cases, for tests that touch the file system.
    pub fn quick() -> ProptestConfig {
        ProptestConfig::with_cases(16)
    }

    /// Default number of cases.
    pub fn standard() -> ProptestConfig {
        ProptestConfig::with_cases(64)
    }

    /// Many cases, for pure in-memory checks.
    pub fn thorough() -> ProptestConfig {
        ProptestConfig::with_cases(256)
    }
}
