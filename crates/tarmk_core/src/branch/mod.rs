//! Copy-on-write branches and optimistic merge.
//!
//! A [`Branch`] captures the root journal's head, collects edits in a
//! [`NodeBuilder`] and publishes them with [`Branch::merge`]:
//!
//! 1. if the head moved since the branch was taken, rebase onto it
//! 2. run the commit hooks over `(base, edited)`
//! 3. write the result and compare-and-swap the journal head
//! 4. on a lost swap go back to 1, at most `merge_retries` times
//!
//! ```text
//! Open ──merge──▶ Merging ──▶ Merged
//!                    │
//!                    ├──▶ Conflicted  (rebase conflict, retries spent)
//!                    └──▶ Failed      (hook or I/O error)
//! ```

mod hooks;
mod rebase;

pub use hooks::{CommitHook, CommitHooks, PostCommitHook};
pub use rebase::rebase_node;

use crate::error::{CoreError, CoreResult};
use crate::gc::RootLease;
use crate::node::{NodeBuilder, NodeState};
use crate::nodestore::SegmentNodeStore;
use crate::types::RecordId;
use tracing::{debug, warn};

/// Lifecycle of a [`Branch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    /// Accepting edits.
    Open,
    /// A merge is in progress.
    Merging,
    /// The edits are visible through the journal.
    Merged,
    /// The edits could not be reconciled with concurrent commits.
    Conflicted,
    /// A hook or the store failed.
    Failed,
}

/// Private line of changes over a captured root.
#[derive(Debug)]
pub struct Branch {
    store: SegmentNodeStore,
    base: NodeState,
    base_id: Option<RecordId>,
    builder: NodeBuilder,
    leases: Vec<RootLease>,
    state: BranchState,
    attempts: u32,
}

impl Branch {
    pub(crate) fn new(store: SegmentNodeStore, lease: RootLease) -> Self {
        let base = lease.root().clone();
        Self {
            store,
            base_id: lease.head(),
            builder: NodeBuilder::new(base.clone()),
            base,
            leases: vec![lease],
            state: BranchState::Open,
            attempts: 0,
        }
    }

    /// Returns the root the edits currently apply to.
    #[must_use]
    pub fn base(&self) -> &NodeState {
        &self.base
    }

    /// Returns the edits.
    #[must_use]
    pub fn builder(&self) -> &NodeBuilder {
        &self.builder
    }

    /// Returns the edits for modification.
    pub fn builder_mut(&mut self) -> &mut NodeBuilder {
        &mut self.builder
    }

    /// Returns the edited root.
    ///
    /// # Errors
    ///
    /// Returns an error if the base cannot be read.
    pub fn root(&self) -> CoreResult<NodeState> {
        self.builder.node_state()
    }

    /// Returns the branch state.
    #[must_use]
    pub fn state(&self) -> BranchState {
        self.state
    }

    /// Returns the merge attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Rebases the edits onto the current head without merging.
    ///
    /// On conflict the branch is left as it was.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the branch is not open,
    /// `MergeConflict` if the edits clash with the head.
    pub fn rebase(&mut self) -> CoreResult<()> {
        if self.state != BranchState::Open {
            return Err(CoreError::invalid_operation(format!(
                "cannot rebase a branch in state {:?}",
                self.state
            )));
        }
        self.rebase_onto_head()
    }

    fn rebase_onto_head(&mut self) -> CoreResult<()> {
        let lease = self.store.retain_root()?;
        if lease.head() == self.base_id {
            return Ok(());
        }
        let ours = self.builder.node_state()?;
        let rebased = rebase_node(&self.base, &ours, lease.root())?;

        self.base = lease.root().clone();
        self.base_id = lease.head();
        self.builder = NodeBuilder::new(rebased);
        // The rebased tree may still share subtrees with earlier bases.
        self.leases.push(lease);
        Ok(())
    }

    /// Publishes the edits.
    ///
    /// Returns the new root. A branch without edits merges without
    /// touching the journal.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` if the branch is not open
    /// - `MergeConflict` if a rebase conflicts or every attempt lost the
    ///   race; the branch becomes [`BranchState::Conflicted`]
    /// - the hook's error, or a store error; the branch becomes
    ///   [`BranchState::Failed`]
    pub fn merge(
        &mut self,
        hooks: &CommitHooks,
        post_commit: Option<&PostCommitHook>,
    ) -> CoreResult<NodeState> {
        if self.state != BranchState::Open {
            return Err(CoreError::invalid_operation(format!(
                "cannot merge a branch in state {:?}",
                self.state
            )));
        }
        self.state = BranchState::Merging;

        let retries = self.store.config().merge_retries.max(1);
        for attempt in 1..=retries {
            self.attempts = attempt;

            if self.store.head() != self.base_id {
                match self.rebase_onto_head() {
                    Ok(()) => {}
                    Err(CoreError::MergeConflict { path, .. }) => {
                        self.state = BranchState::Conflicted;
                        return Err(CoreError::merge_conflict(path, attempt));
                    }
                    Err(e) => return Err(self.fail(e)),
                }
            }

            let edited = self.builder.node_state().map_err(|e| self.fail(e))?;
            if !self.builder.is_modified() && edited.same_identity(&self.base) {
                self.state = BranchState::Merged;
                return Ok(edited);
            }

            let processed = hooks
                .process(&self.base, &edited)
                .map_err(|e| self.fail(e))?;

            match self.store.commit(self.base_id, &processed) {
                Ok(Some(root)) => {
                    self.state = BranchState::Merged;
                    debug!(attempt, head = ?root.record_id(), "branch merged");
                    if let Some(hook) = post_commit {
                        if let Err(e) = hook(&self.base, &root) {
                            warn!(error = %e, "post-commit hook failed");
                        }
                    }
                    return Ok(root);
                }
                Ok(None) => {
                    debug!(attempt, retries, "journal moved during merge, retrying");
                }
                Err(e) => return Err(self.fail(e)),
            }
        }

        self.state = BranchState::Conflicted;
        Err(CoreError::merge_conflict("/", retries))
    }

    fn fail(&mut self, error: CoreError) -> CoreError {
        self.state = BranchState::Failed;
        error
    }
}
