//! Three-way rebase of branch changes onto a newer head.

use crate::error::{CoreError, CoreResult};
use crate::node::{diff_node, NodeBuilder, NodeState, PropertyChange};

/// Applies the changes `base → ours` on top of `theirs`.
///
/// Changes that touch different items combine. Two sides making the same
/// change combine too. Different changes to the same property or child
/// fail with `MergeConflict` naming its path:
///
/// - a property added, changed or removed on both sides differently
/// - a child added on both sides with different content
/// - a child changed on one side and removed on the other
///
/// # Errors
///
/// Returns `MergeConflict` (with `attempts` zero) or a read error.
pub fn rebase_node(base: &NodeState, ours: &NodeState, theirs: &NodeState) -> CoreResult<NodeState> {
    rebase_at("/", base, ours, theirs)
}

fn child_path(path: &str, name: &str) -> String {
    if path == "/" {
        format!("/{name}")
    } else {
        format!("{path}/{name}")
    }
}

fn rebase_at(
    path: &str,
    base: &NodeState,
    ours: &NodeState,
    theirs: &NodeState,
) -> CoreResult<NodeState> {
    if ours.same_identity(base) {
        return Ok(theirs.clone());
    }
    if theirs.same_identity(base) || ours.same_identity(theirs) {
        return Ok(ours.clone());
    }

    let conflict = |name: &str| Err(CoreError::merge_conflict(child_path(path, name), 0));
    let diff = diff_node(base, ours)?;
    if diff.is_empty() {
        return Ok(theirs.clone());
    }
    let mut builder = NodeBuilder::new(theirs.clone());

    for (name, change) in diff.properties {
        let current = theirs.property(&name)?;
        match change {
            PropertyChange::Added(value) => match current {
                None => {
                    builder.set_property(name, value);
                }
                Some(existing) if existing == value => {}
                Some(_) => return conflict(&name),
            },
            PropertyChange::Changed { before, after } => match current {
                Some(existing) if existing == before => {
                    builder.set_property(name, after);
                }
                Some(existing) if existing == after => {}
                _ => return conflict(&name),
            },
            PropertyChange::Deleted(before) => match current {
                None => {}
                Some(existing) if existing == before => {
                    builder.remove_property(&name)?;
                }
                Some(_) => return conflict(&name),
            },
        }
    }

    for (name, added) in diff.added_children {
        match theirs.child(&name)? {
            None => {
                builder.set_child(name, added);
            }
            Some(existing) if existing.equals(&added)? => {}
            Some(_) => return conflict(&name),
        }
    }

    for (name, (before, after)) in diff.changed_children {
        let Some(current) = theirs.child(&name)? else {
            if before.equals(&after)? {
                continue;
            }
            return conflict(&name);
        };
        let merged = rebase_at(&child_path(path, &name), &before, &after, &current)?;
        if !merged.same_identity(&current) {
            builder.set_child(name, merged);
        }
    }

    for (name, before) in diff.deleted_children {
        match theirs.child(&name)? {
            None => {}
            Some(existing) if existing.equals(&before)? => {
                builder.remove_child(&name)?;
            }
            Some(_) => return conflict(&name),
        }
    }

    builder.node_state()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> NodeState {
        let mut builder = NodeBuilder::new(NodeState::empty());
        builder.set_property("shared", 1i64);
        let content = builder.add_child("content");
        content.add_child("a").set_property("v", "a0");
        content.add_child("b").set_property("v", "b0");
        builder.node_state().unwrap()
    }

    fn edit(base: &NodeState, f: impl FnOnce(&mut NodeBuilder)) -> NodeState {
        let mut builder = NodeBuilder::new(base.clone());
        f(&mut builder);
        builder.node_state().unwrap()
    }

    fn value(state: &NodeState, path: &[&str], name: &str) -> Option<String> {
        let mut node = state.clone();
        for step in path {
            node = node.child(step).unwrap()?;
        }
        node.property(name)
            .unwrap()
            .and_then(|v| v.as_str().map(str::to_string))
    }

    #[test]
    fn unchanged_side_takes_the_other() {
        let base = base();
        let theirs = edit(&base, |b| {
            b.set_property("new", "t");
        });
        assert!(rebase_node(&base, &base, &theirs)
            .unwrap()
            .same_identity(&theirs));
        assert!(rebase_node(&base, &theirs, &base)
            .unwrap()
            .same_identity(&theirs));
    }

    #[test]
    fn disjoint_changes_combine() {
        let base = base();
        let ours = edit(&base, |b| {
            let content = b.child_mut("content").unwrap().unwrap();
            content.child_mut("a").unwrap().unwrap().set_property("v", "ours");
        });
        let theirs = edit(&base, |b| {
            let content = b.child_mut("content").unwrap().unwrap();
            content.child_mut("b").unwrap().unwrap().set_property("v", "theirs");
            b.set_property("extra", "t");
        });

        let merged = rebase_node(&base, &ours, &theirs).unwrap();
        assert_eq!(value(&merged, &["content", "a"], "v").as_deref(), Some("ours"));
        assert_eq!(value(&merged, &["content", "b"], "v").as_deref(), Some("theirs"));
        assert_eq!(value(&merged, &[], "extra").as_deref(), Some("t"));
    }

    #[test]
    fn same_property_changed_differently_conflicts() {
        let base = base();
        let ours = edit(&base, |b| {
            let content = b.child_mut("content").unwrap().unwrap();
            content.child_mut("a").unwrap().unwrap().set_property("v", "ours");
        });
        let theirs = edit(&base, |b| {
            let content = b.child_mut("content").unwrap().unwrap();
            content.child_mut("a").unwrap().unwrap().set_property("v", "theirs");
        });

        match rebase_node(&base, &ours, &theirs).unwrap_err() {
            CoreError::MergeConflict { path, .. } => assert_eq!(path, "/content/a/v"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn identical_changes_do_not_conflict() {
        let base = base();
        let change = |b: &mut NodeBuilder| {
            b.set_property("shared", 2i64);
            b.add_child("new").set_property("x", true);
        };
        let ours = edit(&base, change);
        let theirs = edit(&base, change);
        let merged = rebase_node(&base, &ours, &theirs).unwrap();
        assert!(merged.equals(&theirs).unwrap());
    }

    #[test]
    fn changed_child_removed_by_them_conflicts() {
        let base = base();
        let ours = edit(&base, |b| {
            let content = b.child_mut("content").unwrap().unwrap();
            content.child_mut("b").unwrap().unwrap().set_property("v", "ours");
        });
        let theirs = edit(&base, |b| {
            let content = b.child_mut("content").unwrap().unwrap();
            content.remove_child("b").unwrap();
        });
        assert!(matches!(
            rebase_node(&base, &ours, &theirs),
            Err(CoreError::MergeConflict { path, .. }) if path == "/content/b"
        ));
    }

    #[test]
    fn rewritten_but_equal_child_does_not_block_their_removal() {
        let base = base();
        let ours = edit(&base, |b| {
            let content = b.child_mut("content").unwrap().unwrap();
            content.child_mut("b").unwrap().unwrap().set_property("v", "b0");
        });
        let theirs = edit(&base, |b| {
            b.child_mut("content").unwrap().unwrap().remove_child("b").unwrap();
        });
        let merged = rebase_node(&base, &ours, &theirs).unwrap();
        let content = merged.child("content").unwrap().unwrap();
        assert_eq!(content.child_names().unwrap(), vec!["a"]);
    }

    #[test]
    fn deep_edit_rebases_along_its_path() {
        fn chain(depth: usize, leaf: &str) -> NodeState {
            let mut node = NodeState::empty();
            for level in (0..depth).rev() {
                let mut builder = NodeBuilder::new(NodeState::empty());
                builder.set_property("level", i64::try_from(level).unwrap());
                if level == depth - 1 {
                    builder.set_property("leaf", leaf);
                } else {
                    builder.set_child("next", node);
                }
                node = builder.node_state().unwrap();
            }
            node
        }

        let base = chain(300, "base");
        let ours = {
            let mut builder = NodeBuilder::new(base.clone());
            let mut cursor = &mut builder;
            while cursor.has_child("next").unwrap() {
                cursor = cursor.child_mut("next").unwrap().unwrap();
            }
            cursor.set_property("leaf", "ours");
            builder.node_state().unwrap()
        };
        let theirs = edit(&base, |b| {
            b.set_property("top", "theirs");
        });

        let merged = rebase_node(&base, &ours, &theirs).unwrap();
        assert_eq!(value(&merged, &[], "top").as_deref(), Some("theirs"));
        let mut node = merged;
        while let Some(next) = node.child("next").unwrap() {
            node = next;
        }
        assert_eq!(node.property("leaf").unwrap(), Some("ours".into()));
    }

    #[test]
    fn removals_combine_with_unrelated_edits() {
        let base = base();
        let ours = edit(&base, |b| {
            let content = b.child_mut("content").unwrap().unwrap();
            content.remove_child("a").unwrap();
        });
        let theirs = edit(&base, |b| {
            b.remove_property("shared").unwrap();
        });
        let merged = rebase_node(&base, &ours, &theirs).unwrap();
        let content = merged.child("content").unwrap().unwrap();
        assert_eq!(content.child_names().unwrap(), vec!["b"]);
        assert_eq!(merged.property("shared").unwrap(), None);
    }
}
