use crate::error::{MarcusError, Result};
use crate::models::{Assignment, TaskStatus};
use crate::store::KanbanProvider;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Result of reconciling Assignment Persistence against the kanban board at
/// startup (spec.md §4.2 "Failure semantics").
#[derive(Debug, Default, Clone)]
pub struct ReconciliationReport {
    /// Agent ids whose AP record was purged because the task is already DONE.
    pub purged: Vec<String>,
    /// Task ids marked IN_PROGRESS in kanban with no matching AP entry.
    /// Reported, not silently reassigned — MON surfaces these.
    pub orphaned_in_progress: Vec<String>,
}

/// Durable `(agent_id -> Assignment)` record, surviving process restarts
/// (spec.md §4.2). Backed by a single JSON file written with a
/// write-temp/fsync/rename sequence so a crash mid-write never leaves a
/// corrupt or partially-written file in place.
pub struct AssignmentPersistence {
    path: PathBuf,
    assignments: RwLock<HashMap<String, Assignment>>,
}

impl AssignmentPersistence {
    /// Loads existing state from `path` if present; an absent or empty file
    /// starts from an empty assignment set.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let assignments = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)?,
            Ok(_) => HashMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            assignments: RwLock::new(assignments),
        })
    }

    /// Atomic write: save the full set to a sibling temp file, fsync it, then
    /// rename over the real path. Rename is atomic on the same filesystem, so
    /// readers never observe a half-written file.
    async fn persist(&self) -> Result<()> {
        let assignments = self.assignments.read().await;
        let bytes = serde_json::to_vec_pretty(&*assignments)?;
        drop(assignments);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    pub async fn save(&self, agent_id: &str, assignment: Assignment) -> Result<()> {
        self.assignments
            .write()
            .await
            .insert(agent_id.to_string(), assignment);
        self.persist().await
    }

    pub async fn remove(&self, agent_id: &str) -> Result<()> {
        self.assignments.write().await.remove(agent_id);
        self.persist().await
    }

    pub async fn get(&self, agent_id: &str) -> Option<Assignment> {
        self.assignments.read().await.get(agent_id).cloned()
    }

    pub async fn get_all_assigned_task_ids(&self) -> HashSet<String> {
        self.assignments
            .read()
            .await
            .values()
            .map(|a| a.task_id.clone())
            .collect()
    }

    /// Flushes pending writes on shutdown. `persist` is already synchronous
    /// with every mutation, so this is a no-op safety net rather than a batch
    /// flush — kept as an explicit call so callers don't have to reason about
    /// whether writes are buffered.
    pub async fn cleanup(&self) -> Result<()> {
        self.persist().await
    }

    /// On startup, AP is authoritative only relative to kanban's DONE status:
    /// purge any assignment whose task already reached DONE, and report any
    /// kanban task IN_PROGRESS with no matching AP entry rather than silently
    /// reassigning it (spec.md §4.2).
    pub async fn reconcile(&self, kanban: &dyn KanbanProvider) -> Result<ReconciliationReport> {
        let tasks = kanban.get_all_tasks().await.map_err(|e| {
            MarcusError::KanbanUnavailable(format!("reconciliation refresh failed: {e}"))
        })?;
        let by_id: HashMap<&str, &crate::models::Task> =
            tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        let mut report = ReconciliationReport::default();
        {
            let mut assignments = self.assignments.write().await;
            let stale: Vec<String> = assignments
                .iter()
                .filter(|(_, a)| {
                    by_id
                        .get(a.task_id.as_str())
                        .map(|t| t.status == TaskStatus::Done)
                        .unwrap_or(false)
                })
                .map(|(agent_id, _)| agent_id.clone())
                .collect();
            for agent_id in &stale {
                assignments.remove(agent_id);
            }
            report.purged = stale;

            let assigned_task_ids: HashSet<&str> =
                assignments.values().map(|a| a.task_id.as_str()).collect();
            report.orphaned_in_progress = tasks
                .iter()
                .filter(|t| {
                    t.status == TaskStatus::InProgress && !assigned_task_ids.contains(t.id.as_str())
                })
                .map(|t| t.id.clone())
                .collect();
        }

        if !report.purged.is_empty() {
            info!(count = report.purged.len(), "purged stale AP records on startup");
        }
        if !report.orphaned_in_progress.is_empty() {
            warn!(
                tasks = ?report.orphaned_in_progress,
                "kanban tasks in progress with no AP entry; not reassigning"
            );
        }

        self.persist().await?;
        Ok(report)
    }
}
