use crate::config::LeaseConfig;
use crate::constants::{
    COMPLEXITY_LARGE_MAX_HOURS, COMPLEXITY_MEDIUM_MAX_HOURS, COMPLEXITY_MULTIPLIER_LARGE,
    COMPLEXITY_MULTIPLIER_MEDIUM, COMPLEXITY_MULTIPLIER_SMALL, COMPLEXITY_MULTIPLIER_XLARGE,
    COMPLEXITY_SMALL_MAX_HOURS,
};
use crate::error::{MarcusError, Result};
use crate::models::{Lease, Priority};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

fn complexity_multiplier(estimated_hours: f64) -> f64 {
    if estimated_hours <= COMPLEXITY_SMALL_MAX_HOURS {
        COMPLEXITY_MULTIPLIER_SMALL
    } else if estimated_hours <= COMPLEXITY_MEDIUM_MAX_HOURS {
        COMPLEXITY_MULTIPLIER_MEDIUM
    } else if estimated_hours <= COMPLEXITY_LARGE_MAX_HOURS {
        COMPLEXITY_MULTIPLIER_LARGE
    } else {
        COMPLEXITY_MULTIPLIER_XLARGE
    }
}

/// Lease plus the scheduling inputs needed to recompute its duration on
/// renewal. Kept internal — callers only ever see the `Lease` view.
struct LeaseEntry {
    lease: Lease,
    priority: Priority,
    estimated_hours: f64,
}

impl LeaseEntry {
    fn effective_duration(&self, config: &LeaseConfig, renewal_count: u32) -> Duration {
        let base = config.default_hours
            * self.priority.lease_multiplier()
            * complexity_multiplier(self.estimated_hours);
        let decayed = base * config.renewal_decay_factor.powi(renewal_count as i32);
        let clamped = decayed.clamp(config.min_lease_hours, config.max_lease_hours);
        Duration::milliseconds((clamped * 3_600_000.0) as i64)
    }
}

/// Aggregate lease health, returned by `Statistics()` (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct LeaseStatistics {
    pub active: usize,
    pub expired: usize,
    pub renewals_total: u64,
    pub avg_duration_hours: f64,
    pub expiring_soon: Vec<String>,
    pub oldest: Option<String>,
}

/// Time-bounded promise that an agent is actively working a task (spec.md
/// §4.3). Mutations on a single task are serialized by that task's own
/// `Mutex`; the registry `RwLock` is only held long enough to look the entry
/// up or insert/remove it, so concurrent renewals of different tasks never
/// contend with each other.
pub struct LeaseManager {
    config: LeaseConfig,
    leases: RwLock<HashMap<String, Arc<Mutex<LeaseEntry>>>>,
}

impl LeaseManager {
    pub fn new(config: LeaseConfig) -> Self {
        Self {
            config,
            leases: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(
        &self,
        task_id: &str,
        agent_id: &str,
        priority: Priority,
        estimated_hours: f64,
    ) -> Lease {
        let now = Utc::now();
        let entry = LeaseEntry {
            lease: Lease {
                task_id: task_id.to_string(),
                agent_id: agent_id.to_string(),
                lease_expires: now, // overwritten below once duration is known
                renewal_count: 0,
                last_progress: 0,
                progress_unchanged_renewals: 0,
                stuck: false,
                created_at: now,
            },
            priority,
            estimated_hours,
        };
        let duration = entry.effective_duration(&self.config, 0);
        let mut entry = entry;
        entry.lease.lease_expires = now + duration;

        let lease = entry.lease.clone();
        self.leases
            .write()
            .await
            .insert(task_id.to_string(), Arc::new(Mutex::new(entry)));
        debug!(task_id, agent_id, expires = %lease.lease_expires, "lease created");
        lease
    }

    /// Renews a lease: advances `renewal_count`, recomputes `lease_expires`,
    /// and flags `stuck` if progress hasn't moved across
    /// `stuck_threshold_renewals` consecutive renewals. A stuck lease is
    /// still renewed — reclamation is MON's decision, not LM's (spec.md
    /// §4.3).
    pub async fn renew(&self, task_id: &str, progress: u8) -> Result<Lease> {
        let entry_arc = {
            let leases = self.leases.read().await;
            leases
                .get(task_id)
                .cloned()
                .ok_or_else(|| MarcusError::TaskNotAssigned(task_id.to_string()))?
        };
        let mut entry = entry_arc.lock().await;

        if progress == entry.lease.last_progress {
            entry.lease.progress_unchanged_renewals += 1;
        } else {
            entry.lease.progress_unchanged_renewals = 0;
            entry.lease.last_progress = progress;
        }
        entry.lease.renewal_count += 1;
        if entry.lease.progress_unchanged_renewals >= self.config.stuck_threshold_renewals {
            entry.lease.stuck = true;
            warn!(task_id, renewals = entry.lease.renewal_count, "lease flagged stuck");
        }

        let duration = entry.effective_duration(&self.config, entry.lease.renewal_count);
        entry.lease.lease_expires = Utc::now() + duration;

        Ok(entry.lease.clone())
    }

    /// Removes a lease on completion or reclamation (spec.md §4.3 `Expire`).
    pub async fn expire(&self, task_id: &str) {
        if self.leases.write().await.remove(task_id).is_some() {
            debug!(task_id, "lease expired/removed");
        }
    }

    pub async fn get(&self, task_id: &str) -> Option<Lease> {
        let entry_arc = self.leases.read().await.get(task_id).cloned()?;
        Some(entry_arc.lock().await.lease.clone())
    }

    /// Task ids whose lease has passed `lease_expires`. Consulted by the
    /// lease monitor, which reclaims each via `UnassignTask`.
    pub async fn expired_task_ids(&self) -> Vec<String> {
        let leases = self.leases.read().await;
        let mut expired = Vec::new();
        let now = Utc::now();
        for (task_id, entry) in leases.iter() {
            if entry.lock().await.lease.lease_expires < now {
                expired.push(task_id.clone());
            }
        }
        expired
    }

    pub async fn statistics(&self) -> LeaseStatistics {
        let leases = self.leases.read().await;
        let now = Utc::now();
        let warning_window = Duration::milliseconds(
            (self.config.warning_hours * 3_600_000.0) as i64,
        );

        let mut renewals_total = 0u64;
        let mut total_duration_hours = 0.0;
        let mut expiring_soon = Vec::new();
        let mut oldest: Option<(String, DateTime<Utc>)> = None;
        let mut expired = 0usize;

        for (task_id, entry) in leases.iter() {
            let entry = entry.lock().await;
            renewals_total += entry.lease.renewal_count as u64;
            total_duration_hours +=
                (entry.lease.lease_expires - entry.lease.created_at).num_seconds() as f64 / 3600.0;

            if entry.lease.lease_expires < now {
                expired += 1;
            } else if entry.lease.lease_expires - now <= warning_window {
                expiring_soon.push(task_id.clone());
            }

            match &oldest {
                Some((_, oldest_created)) if *oldest_created <= entry.lease.created_at => {}
                _ => oldest = Some((task_id.clone(), entry.lease.created_at)),
            }
        }

        let active = leases.len();
        let avg_duration_hours = if active > 0 {
            total_duration_hours / active as f64
        } else {
            0.0
        };

        LeaseStatistics {
            active,
            expired,
            renewals_total,
            avg_duration_hours,
            expiring_soon,
            oldest: oldest.map(|(id, _)| id),
        }
    }
}
