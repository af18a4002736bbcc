//! Commit hooks.

use crate::error::CoreResult;
use crate::node::NodeState;
use std::fmt;
use std::sync::Arc;

/// A function from `(before, after)` to the state that should be committed.
pub type CommitHook = Arc<dyn Fn(&NodeState, &NodeState) -> CoreResult<NodeState> + Send + Sync>;

/// A function run with `(before, after)` once a merge is visible.
pub type PostCommitHook = Arc<dyn Fn(&NodeState, &NodeState) -> CoreResult<()> + Send + Sync>;

/// Ordered chain of commit hooks.
///
/// Each hook sees the base and the output of the previous hook. Hooks run
/// without any store lock held and may run more than once per merge when
/// the merge is retried.
#[derive(Clone, Default)]
pub struct CommitHooks {
    hooks: Vec<CommitHook>,
}

impl CommitHooks {
    /// Returns the pass-through chain.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Appends a hook.
    #[must_use]
    pub fn with<F>(mut self, hook: F) -> Self
    where
        F: Fn(&NodeState, &NodeState) -> CoreResult<NodeState> + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Runs the chain. The first error stops it.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing hook.
    pub fn process(&self, before: &NodeState, after: &NodeState) -> CoreResult<NodeState> {
        let mut current = after.clone();
        for hook in &self.hooks {
            current = hook(before, &current)?;
        }
        Ok(current)
    }

    /// Returns the number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if the chain passes states through unchanged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for CommitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitHooks")
            .field("len", &self.hooks.len())
            .finish()
    }
}
