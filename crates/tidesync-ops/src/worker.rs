//! Per-root sync scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tidesync_analyze::{refine, CycleDetector, RefinedEventCollection};
use tidesync_core::{ConnectionStatus, FailureClass};
use tidesync_crawl::Crawler;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::apply::Applier;
use crate::commit::CommitHandle;
use crate::error::SyncError;

/// Counters of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Raw events detected by the crawl.
    pub events: usize,
    /// Items handed to the applier.
    pub items: usize,
    /// Pairs merged into one rename or move.
    pub merged: usize,
    /// Pairs degraded to delete + create.
    pub fallbacks: usize,
    /// Store commits that changed a record.
    pub committed: usize,
    /// Store commits deferred to the next cycle.
    pub deferred: usize,
    /// Wall time of the cycle.
    pub elapsed: Duration,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CycleResult {
    /// Crawled, applied and committed.
    Completed(CycleReport),
    /// Aborted by an error.
    Failed {
        class: FailureClass,
        /// The remote could not be reached or refused access.
        remote: bool,
        message: String,
    },
    /// Cancelled before handoff to the applier.
    Cancelled,
}

/// Outcome of one cycle, published on the worker's watch channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    /// Sequence number, starting at 1.
    pub cycle: u64,
    /// When the cycle finished.
    pub finished_at: DateTime<Utc>,
    /// How it ended.
    pub result: CycleResult,
}

impl CycleOutcome {
    /// Check if the failure halted the worker.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.result,
            CycleResult::Failed {
                class: FailureClass::Fatal,
                ..
            }
        )
    }
}

/// Crawl, refine and apply once, blocking the calling thread.
///
/// Cancellation is honoured up to the handoff to the applier; once the
/// applier runs the cycle completes.
pub fn run_cycle(
    crawler: &Crawler,
    applier: &dyn Applier,
    cancel: &CancellationToken,
) -> Result<CycleReport, SyncError> {
    let start = Instant::now();
    let events = crawler.crawl(cancel)?;
    let plan = CycleDetector::new().detect(&events);
    let refined: RefinedEventCollection = refine(&events, &plan);
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    let mut commit = CommitHandle::new(Arc::clone(crawler.store()));
    applier.apply(&refined, &mut commit)?;

    Ok(CycleReport {
        events: events.len(),
        items: refined.len(),
        merged: refined.merged_count(),
        fallbacks: refined.fallback_count(),
        committed: commit.written(),
        deferred: commit.deferred().len(),
        elapsed: start.elapsed(),
    })
}

/// Scheduler for one sync root.
///
/// Cycles run on the poll interval and on change notifications, never
/// overlapping. A trigger that arrives while a cycle runs starts another
/// cycle right after it. A fatal failure halts the worker until
/// [`WorkerHandle::resume`] is called.
pub struct SyncRootWorker {
    name: String,
    crawler: Arc<Crawler>,
    applier: Arc<dyn Applier>,
    poll_interval: Duration,
}

impl SyncRootWorker {
    /// Create a worker.
    pub fn new(
        name: impl Into<String>,
        crawler: Crawler,
        applier: Arc<dyn Applier>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            crawler: Arc::new(crawler),
            applier,
            poll_interval,
        }
    }

    /// Start the worker on the current tokio runtime.
    ///
    /// The first cycle starts immediately.
    pub fn spawn(self) -> WorkerHandle {
        let control = Control {
            notify: Arc::new(Notify::new()),
            resume: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
            status: Arc::new(RwLock::new(ConnectionStatus::new())),
        };
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let task = tokio::spawn(self.run(control.clone(), outcome_tx));

        WorkerHandle {
            control,
            outcome_rx,
            task,
        }
    }

    async fn run(self, control: Control, outcome_tx: watch::Sender<Option<CycleOutcome>>) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle = 0u64;
        info!(
            root = %self.name,
            interval_secs = self.poll_interval.as_secs(),
            "Sync worker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = control.cancel.cancelled() => break,
                _ = control.notify.notified() => debug!(root = %self.name, "Change notification"),
                _ = interval.tick() => {}
            }

            cycle += 1;
            let result = self.cycle(&control).await;
            control.record(&result);
            let outcome = CycleOutcome {
                cycle,
                finished_at: Utc::now(),
                result,
            };
            let fatal = outcome.is_fatal();
            outcome_tx.send_replace(Some(outcome));

            if fatal {
                warn!(root = %self.name, cycle, "Fatal failure, worker halted until resumed");
                tokio::select! {
                    biased;
                    _ = control.cancel.cancelled() => break,
                    _ = control.resume.notified() => {
                        info!(root = %self.name, "Worker resumed");
                        interval.reset_immediately();
                    }
                }
            }
        }
        info!(root = %self.name, cycles = cycle, "Sync worker stopped");
    }

    async fn cycle(&self, control: &Control) -> CycleResult {
        let crawler = Arc::clone(&self.crawler);
        let applier = Arc::clone(&self.applier);
        let cancel = control.cancel.child_token();

        let joined = tokio::task::spawn_blocking(move || {
            run_cycle(&crawler, applier.as_ref(), &cancel)
        })
        .await;

        match joined.unwrap_or_else(|e| Err(SyncError::Task(e.to_string()))) {
            Ok(report) => {
                info!(
                    root = %self.name,
                    events = report.events,
                    merged = report.merged,
                    committed = report.committed,
                    deferred = report.deferred,
                    "Cycle complete"
                );
                CycleResult::Completed(report)
            }
            Err(e) if e.is_cancelled() => CycleResult::Cancelled,
            Err(e) => {
                warn!(root = %self.name, error = %e, "Cycle failed");
                CycleResult::Failed {
                    class: e.failure_class(),
                    remote: e.is_remote(),
                    message: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for SyncRootWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRootWorker")
            .field("name", &self.name)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct Control {
    notify: Arc<Notify>,
    resume: Arc<Notify>,
    cancel: CancellationToken,
    status: Arc<RwLock<ConnectionStatus>>,
}

impl Control {
    fn record(&self, result: &CycleResult) {
        let now = Utc::now();
        match result {
            CycleResult::Completed(_) => self.status.write().mark_connected(now),
            CycleResult::Failed {
                class,
                remote,
                message,
            } if *remote || !class.is_transient() => {
                self.status.write().mark_disconnected(now, message.clone());
            }
            CycleResult::Failed { .. } | CycleResult::Cancelled => {}
        }
    }
}

/// Control surface of a running [`SyncRootWorker`].
#[derive(Debug)]
pub struct WorkerHandle {
    control: Control,
    outcome_rx: watch::Receiver<Option<CycleOutcome>>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Report an external change; a cycle runs as soon as none is running.
    pub fn notify_change(&self) {
        self.control.notify.notify_one();
    }

    /// Leave the halted state after the cause of a fatal failure was fixed.
    pub fn resume(&self) {
        self.control.resume.notify_one();
    }

    /// Stop the worker. A running crawl is cancelled.
    pub fn cancel(&self) {
        self.control.cancel.cancel();
    }

    /// Watch cycle outcomes. Holds `None` until the first cycle ends.
    pub fn outcomes(&self) -> watch::Receiver<Option<CycleOutcome>> {
        self.outcome_rx.clone()
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.control.status.read().clone()
    }

    /// Cancel and wait for the worker to stop.
    pub async fn shutdown(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync worker task ended abnormally");
        }
    }
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
