//! Sync-root scheduling and identity commits for tidesync.
//!
//! This crate runs the per-root cycle: crawl both trees, detect rename
//! cycles, refine the events, hand them to an [`Applier`] and commit the
//! confirmed results to the identity store through a [`CommitHandle`].
//!
//! [`SyncRootWorker`] schedules those cycles on a tokio runtime, one task
//! per sync root, and reports each [`CycleOutcome`] on a watch channel.

mod apply;
mod commit;
mod error;
mod worker;

pub use apply::{Applier, RecordOnlyApplier};
pub use commit::{CommitHandle, CommitOutcome, DeferredCommit};
pub use error::SyncError;
pub use worker::{
    run_cycle, CycleOutcome, CycleReport, CycleResult, SyncRootWorker, WorkerHandle,
};
