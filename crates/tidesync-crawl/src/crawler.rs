//! Crawl orchestration for one sync root.

use std::sync::Arc;
use std::time::Instant;

use tidesync_core::{CrawlEventCollection, IgnoreList, MappedObject, SyncPath};
use tidesync_store::IdentityStore;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::correlate::correlate;
use crate::error::CrawlError;
use crate::progress::{CrawlPhase, CrawlProgress};
use crate::tree::{LocalTree, RemoteTree, SessionHandle, walk_local, walk_remote};

/// Crawler comparing both trees of one sync root with its identity store.
///
/// The ignore list is shared with whoever edits it; it is compiled once at
/// the start of every crawl so edits take effect on the next cycle.
pub struct Crawler {
    store: Arc<dyn IdentityStore>,
    local: Arc<dyn LocalTree>,
    remote: Arc<dyn RemoteTree>,
    session: SessionHandle,
    ignore: IgnoreList,
    progress_tx: broadcast::Sender<CrawlProgress>,
}

impl Crawler {
    /// Create a crawler with an anonymous remote session.
    pub fn new(
        store: Arc<dyn IdentityStore>,
        local: Arc<dyn LocalTree>,
        remote: Arc<dyn RemoteTree>,
        ignore: IgnoreList,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            store,
            local,
            remote,
            session: SessionHandle::anonymous(),
            ignore,
            progress_tx,
        }
    }

    /// Use a transport-specific session for remote calls.
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = session;
        self
    }

    /// Subscribe to crawl progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlProgress> {
        self.progress_tx.subscribe()
    }

    /// The shared ignore list.
    pub fn ignore_list(&self) -> &IgnoreList {
        &self.ignore
    }

    /// The identity store this crawler compares against.
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// Walk both trees and correlate them with the store.
    ///
    /// Blocks the calling thread; async callers should run it on a
    /// blocking pool. Nothing is written to the store.
    pub fn crawl(&self, cancel: &CancellationToken) -> Result<CrawlEventCollection, CrawlError> {
        let start = Instant::now();
        let rules = self.ignore.snapshot()?;
        let mut progress = CrawlProgress::new();
        self.send(&progress);

        let (local, remote) = rayon::join(
            || walk_local(self.local.as_ref(), &rules, cancel),
            || walk_remote(self.remote.as_ref(), &self.session, &rules, cancel),
        );
        let (local, unreadable) = local?;
        let mut remote = remote?;
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }
        let held_back = |path: &SyncPath| unreadable.iter().any(|dir| path.starts_with(dir));
        if !unreadable.is_empty() {
            warn!(folders = unreadable.len(), "Holding back unreadable local folders this cycle");
            remote.entries.retain(|_, entry| !held_back(&entry.path));
        }

        progress.phase = CrawlPhase::Correlating;
        progress.local_items = local.len() as u64;
        progress.remote_items = remote.entries.len() as u64;
        progress.elapsed = start.elapsed();
        self.send(&progress);

        let records: Vec<MappedObject> = self
            .store
            .records()
            .into_iter()
            .filter(|record| !rules.is_ignored(&record.path) && !held_back(&record.path))
            .collect();
        debug!(
            records = records.len(),
            local = local.len(),
            remote = remote.entries.len(),
            "Correlating trees"
        );
        let events = correlate(&records, &local, &remote)?;

        progress.phase = CrawlPhase::Done;
        progress.events = events.len() as u64;
        progress.pairs = events.mergeable().len() as u64;
        progress.elapsed = start.elapsed();
        self.send(&progress);

        info!(
            events = events.len(),
            pairs = events.mergeable().len(),
            elapsed_ms = progress.elapsed.as_millis() as u64,
            "Crawl complete"
        );
        Ok(events)
    }

    fn send(&self, progress: &CrawlProgress) {
        // No subscribers is fine.
        let _ = self.progress_tx.send(progress.clone());
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("records", &self.store.len())
            .field("ignore", &self.ignore)
            .finish_non_exhaustive()
    }
}
