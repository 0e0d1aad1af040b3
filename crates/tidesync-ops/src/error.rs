//! Error types for sync cycles.

use thiserror::Error;
use tidesync_core::{FailureClass, SyncPath};
use tidesync_crawl::{CollaboratorError, CrawlError};
use tidesync_store::StoreError;

/// Errors that end a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Crawling failed.
    #[error(transparent)]
    Crawl(#[from] CrawlError),

    /// The applier reported a failure.
    #[error("Applier: {0}")]
    Apply(#[source] CollaboratorError),

    /// The identity store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A confirmed event has no identity to record.
    #[error("Confirmed event at {path} carries no identity")]
    MissingIdentity { path: SyncPath },

    /// The blocking cycle task panicked or was aborted.
    #[error("Cycle task failed: {0}")]
    Task(String),

    /// The cycle was cancelled before handoff.
    #[error("Cycle cancelled")]
    Cancelled,
}

impl SyncError {
    /// How the error affects the worker.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Crawl(e) => e.failure_class(),
            Self::Apply(e) => e.class(),
            Self::MissingIdentity { .. } => FailureClass::Fatal,
            Self::Store(_) | Self::Task(_) | Self::Cancelled => FailureClass::Transient,
        }
    }

    /// Check if the cycle was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Crawl(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Check if the failure came from talking to the remote.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Crawl(CrawlError::Remote(_)))
    }
}
