//! The applier contract.

use tidesync_analyze::RefinedEventCollection;
use tracing::debug;

use crate::commit::CommitHandle;
use crate::error::SyncError;

/// Carries a refined event collection over to the opposite tree.
///
/// Items must be applied in collection order. After each operation is
/// confirmed on the target side, the applier records the new state through
/// the [`CommitHandle`]; nothing may be committed for an operation that
/// did not succeed. A failing operation should end the call with
/// [`SyncError::Apply`], classified transient or fatal. Applying the same
/// collection twice must be harmless.
pub trait Applier: Send + Sync {
    /// Apply every item in order.
    fn apply(
        &self,
        events: &RefinedEventCollection,
        commit: &mut CommitHandle,
    ) -> Result<(), SyncError>;
}

/// Applier that performs no operations and records every event with a
/// known identity as already applied.
///
/// Used to adopt an existing pair of trees into the identity store, and
/// by dry runs that only need the store to follow the remote.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordOnlyApplier;

impl Applier for RecordOnlyApplier {
    fn apply(
        &self,
        events: &RefinedEventCollection,
        commit: &mut CommitHandle,
    ) -> Result<(), SyncError> {
        for item in events.iter() {
            let event = item.event();
            if event.object_id.is_none() {
                debug!(path = %event.snapshot.path, "Skipping event without identity");
                continue;
            }
            commit.confirm(event, None)?;
        }
        Ok(())
    }
}
