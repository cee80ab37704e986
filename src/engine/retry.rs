use crate::config::RetryConfig;
use crate::models::{Assignment, Task};
use chrono::Utc;

/// Hint returned when `RequestNextTask` finds no assignable task (spec.md
/// §4.5.1 step 11).
#[derive(Debug, Clone)]
pub struct RetryHint {
    pub seconds: u64,
    pub reason: String,
    pub blocking_task_id: Option<String>,
}

impl RetryHint {
    /// The original implementation's flat response when there's nothing
    /// in progress to estimate against at all (no per-task ETA to compute).
    pub fn no_active_work() -> Self {
        Self {
            seconds: 300,
            reason: "No tasks currently in progress".to_string(),
            blocking_task_id: None,
        }
    }
}

/// Estimates when the soonest in-progress task is likely to unblock
/// (spec.md §4.5.1 step 11). `in_progress` pairs each IN_PROGRESS task with
/// the assignment that's holding it, from which elapsed time is derived.
pub fn compute(in_progress: &[(Task, Assignment)], config: &RetryConfig) -> RetryHint {
    if in_progress.is_empty() {
        return RetryHint::no_active_work();
    }

    let now = Utc::now();
    let fallback_seconds = config.fallback_hours * 3600.0;

    let mut best: Option<(f64, &str)> = None;
    for (task, assignment) in in_progress {
        let elapsed_seconds = (now - assignment.assigned_at).num_seconds().max(0) as f64;
        let progress_fraction = task.progress as f64 / 100.0;

        let remaining = if progress_fraction > 0.0 {
            let epsilon = 1e-3;
            (elapsed_seconds / progress_fraction.max(epsilon)) * (1.0 - progress_fraction)
        } else {
            fallback_seconds
        };

        match best {
            Some((best_remaining, _)) if best_remaining <= remaining => {}
            _ => best = Some((remaining, task.id.as_str())),
        }
    }

    let (min_remaining, blocking_task_id) = best.expect("in_progress is non-empty");
    let buffered = min_remaining + min_remaining * config.buffer_fraction;
    let seconds = buffered.clamp(config.floor_seconds as f64, config.cap_seconds as f64) as u64;

    RetryHint {
        seconds,
        reason: format!("waiting on task {blocking_task_id} to free up capacity"),
        blocking_task_id: Some(blocking_task_id.to_string()),
    }
}
