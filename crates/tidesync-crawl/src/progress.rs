//! Crawl progress reporting.

use std::time::Duration;

use serde::Serialize;

/// Stage of a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlPhase {
    /// Reading the local and remote trees.
    Walking,
    /// Comparing the trees against the identity store and pairing
    /// deletions with creations.
    Correlating,
    /// The event collection is complete.
    Done,
}

/// Progress information during a crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlProgress {
    /// Current stage.
    pub phase: CrawlPhase,
    /// Local items seen (after ignore filtering).
    pub local_items: u64,
    /// Remote items seen (after ignore filtering).
    pub remote_items: u64,
    /// Events emitted so far.
    pub events: u64,
    /// Mergeable pairs found so far.
    pub pairs: u64,
    /// Time since the crawl started.
    pub elapsed: Duration,
}

impl CrawlProgress {
    /// Progress at the start of a crawl.
    pub fn new() -> Self {
        Self {
            phase: CrawlPhase::Walking,
            local_items: 0,
            remote_items: 0,
            events: 0,
            pairs: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Items seen on both sides.
    pub fn total_items(&self) -> u64 {
        self.local_items + self.remote_items
    }
}

impl Default for CrawlProgress {
    fn default() -> Self {
        Self::new()
    }
}
