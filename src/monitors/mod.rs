//! Background reconciliation loops (spec.md §4.6 "Monitors").
//!
//! Two independently paced loops run for the lifetime of the process: the
//! lease monitor reclaims expired assignments, and the assignment monitor
//! reconciles `AssignmentPersistence` against the kanban board. Both operate
//! on snapshots and commit through the same mutation APIs `AssignmentEngine`
//! uses, under its assignment lock — they never hold a lock across an
//! `.await` of their own.

use crate::constants::MIN_MONITOR_POLL_SECS;
use crate::engine::AssignmentEngine;
use crate::lease::LeaseManager;
use crate::persistence::AssignmentPersistence;
use crate::store::KanbanProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Derives a monitor's poll interval from the configured warning threshold
/// (spec.md §4.6: "every poll interval (default: 1/4 of warning_threshold)"),
/// floored so a near-zero threshold can't spin the loop.
fn poll_interval(warning_hours: f64) -> Duration {
    let secs = ((warning_hours * 3600.0) / 4.0).max(MIN_MONITOR_POLL_SECS as f64);
    Duration::from_secs_f64(secs)
}

/// Reclaims any lease past `lease_expires` by calling `UnassignTask` through
/// the engine, exactly as an administrator would (spec.md §4.6 "Lease
/// monitor"). Ticks are skipped, not queued, if the previous tick is still
/// running (spec.md §5 "Backpressure").
pub struct LeaseMonitor {
    engine: Arc<AssignmentEngine>,
    lease: Arc<LeaseManager>,
    interval: Duration,
    busy: AtomicBool,
}

impl LeaseMonitor {
    pub fn new(engine: Arc<AssignmentEngine>, lease: Arc<LeaseManager>, warning_hours: f64) -> Self {
        Self {
            engine,
            lease,
            interval: poll_interval(warning_hours),
            busy: AtomicBool::new(false),
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                if self.busy.swap(true, Ordering::SeqCst) {
                    continue;
                }
                self.tick().await;
                self.busy.store(false, Ordering::SeqCst);
            }
        })
    }

    async fn tick(&self) {
        let expired = self.lease.expired_task_ids().await;
        for task_id in expired {
            match self.engine.unassign_task(&task_id, None).await {
                Ok(()) => info!(task_id, "lease expired; task reclaimed"),
                Err(e) if e.to_string().contains("not assigned") => {
                    // Already cleared by a completion racing this tick.
                }
                Err(e) => error!(task_id, error = %e, "failed to reclaim expired lease"),
            }
        }
    }
}

/// Reconciles `AssignmentPersistence` against the kanban board: purges
/// records for tasks already DONE, and flags any kanban task IN_PROGRESS
/// with no matching AP entry rather than silently reassigning it (spec.md
/// §4.6 "Assignment monitor", §4.2 "Failure semantics").
pub struct AssignmentMonitor {
    persistence: Arc<AssignmentPersistence>,
    kanban: Arc<dyn KanbanProvider>,
    interval: Duration,
    busy: AtomicBool,
}

impl AssignmentMonitor {
    pub fn new(
        persistence: Arc<AssignmentPersistence>,
        kanban: Arc<dyn KanbanProvider>,
        warning_hours: f64,
    ) -> Self {
        Self {
            persistence,
            kanban,
            interval: poll_interval(warning_hours),
            busy: AtomicBool::new(false),
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                if self.busy.swap(true, Ordering::SeqCst) {
                    continue;
                }
                self.tick().await;
                self.busy.store(false, Ordering::SeqCst);
            }
        })
    }

    async fn tick(&self) {
        match self.persistence.reconcile(self.kanban.as_ref()).await {
            Ok(report) => {
                if !report.orphaned_in_progress.is_empty() {
                    warn!(
                        tasks = ?report.orphaned_in_progress,
                        "assignment monitor: in-progress kanban tasks with no AP entry"
                    );
                }
            }
            Err(e) => error!(error = %e, "assignment reconciliation failed"),
        }
    }
}

/// Handles for the two background loops, held by `main` so they can be
/// aborted on shutdown.
pub struct Monitors {
    pub lease_handle: JoinHandle<()>,
    pub assignment_handle: JoinHandle<()>,
}

impl Monitors {
    pub fn start(
        engine: Arc<AssignmentEngine>,
        lease: Arc<LeaseManager>,
        persistence: Arc<AssignmentPersistence>,
        kanban: Arc<dyn KanbanProvider>,
        warning_hours: f64,
    ) -> Self {
        let lease_monitor = Arc::new(LeaseMonitor::new(engine, lease, warning_hours));
        let assignment_monitor = Arc::new(AssignmentMonitor::new(persistence, kanban, warning_hours));
        Self {
            lease_handle: lease_monitor.spawn(),
            assignment_handle: assignment_monitor.spawn(),
        }
    }

    pub fn abort(&self) {
        self.lease_handle.abort();
        self.assignment_handle.abort();
    }
}
