//! Write failure latch.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use tracing::error;

/// Set by the first failed write to a tar store.
///
/// A failed append or journal line may have left partial bytes behind, so
/// nothing more is written until the store is reopened and recovery has
/// cut them off. Reads are unaffected.
#[derive(Debug, Default)]
pub(crate) struct FailureLatch {
    cause: Mutex<Option<String>>,
}

impl FailureLatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `StoreFailed` once the latch is set.
    pub(crate) fn check(&self) -> CoreResult<()> {
        match &*self.cause.lock() {
            Some(message) => Err(CoreError::StoreFailed {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Passes `result` through, setting the latch if it is an error.
    pub(crate) fn guard<T, E>(&self, result: Result<T, E>) -> CoreResult<T>
    where
        E: Into<CoreError>,
    {
        result.map_err(|e| {
            let e = e.into();
            let mut cause = self.cause.lock();
            if cause.is_none() {
                error!(error = %e, "tar store write failed, refusing further writes until reopened");
                *cause = Some(e.to_string());
            }
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn first_error_sets_the_latch() {
        let latch = FailureLatch::new();
        assert!(latch.check().is_ok());
        assert_eq!(latch.guard(Ok::<_, io::Error>(3)).unwrap(), 3);
        assert!(latch.check().is_ok());

        let err = latch.guard::<(), _>(Err(io::Error::other("disk gone")));
        assert!(matches!(err, Err(CoreError::Io(_))));
        let _ = latch.guard::<(), _>(Err(io::Error::other("second")));

        match latch.check() {
            Err(CoreError::StoreFailed { message }) => assert!(message.contains("disk gone")),
            other => panic!("expected StoreFailed, got {other:?}"),
        }
    }
}
