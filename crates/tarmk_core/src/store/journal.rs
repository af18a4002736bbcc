//! Named journal pointers.

use crate::error::CoreResult;
use crate::stats::StoreStats;
use crate::types::RecordId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Durable record of journal updates.
///
/// The tar store appends one line per update to `journal.log`; the memory
/// store keeps no log.
pub trait JournalLog: Send + Sync {
    /// Persists that journal `name` now points at `head`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update cannot be persisted. The journal is
    /// then left unchanged.
    fn record(&self, name: &str, head: RecordId) -> CoreResult<()>;
}

/// A named, atomically updated pointer to the current snapshot.
///
/// `None` is the empty snapshot. Heads only move forward through
/// [`compare_and_set`](Self::compare_and_set); a journal never returns to
/// empty.
pub struct Journal {
    name: String,
    head: Mutex<Option<RecordId>>,
    log: Option<Arc<dyn JournalLog>>,
    stats: Arc<StoreStats>,
}

impl Journal {
    pub(crate) fn new(
        name: &str,
        head: Option<RecordId>,
        log: Option<Arc<dyn JournalLog>>,
        stats: Arc<StoreStats>,
    ) -> Self {
        Self {
            name: name.to_string(),
            head: Mutex::new(head),
            log,
            stats,
        }
    }

    /// Returns the journal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current head.
    #[must_use]
    pub fn head(&self) -> Option<RecordId> {
        *self.head.lock()
    }

    /// Moves the head to `new` if it still equals `expected`.
    ///
    /// Returns `Ok(false)` when another update got there first. The lock is
    /// held only for the comparison, the log append and the swap.
    ///
    /// # Errors
    ///
    /// Returns an error if the update cannot be logged; the head is then
    /// unchanged.
    pub fn compare_and_set(&self, expected: Option<RecordId>, new: RecordId) -> CoreResult<bool> {
        let mut head = self.head.lock();
        if *head != expected {
            return Ok(false);
        }
        if let Some(log) = &self.log {
            log.record(&self.name, new)?;
        }
        *head = Some(new);
        self.stats.record_journal_update();
        trace!(journal = %self.name, head = %new, "journal advanced");
        Ok(true)
    }
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("name", &self.name)
            .field("head", &self.head())
            .finish()
    }
}
