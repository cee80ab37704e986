pub mod filters;
pub mod phase;
pub mod retry;
pub mod scoring;

use crate::ai::{InstructionContext, InstructionEngine};
use crate::config::Config;
use crate::error::{MarcusError, Result};
use crate::lease::LeaseManager;
use crate::models::{Assignment, BlockerSeverity, Priority, ReportedStatus, Task, TaskStatus};
use crate::persistence::AssignmentPersistence;
use crate::registry::AgentRegistry;
use crate::store::{KanbanProvider, ProgressUpdate, TaskStore, TaskUpdate};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Successful outcome of `request_next_task` (spec.md §6 `request_next_task`).
#[derive(Debug, Clone)]
pub struct AssignedTask {
    pub task_id: String,
    pub name: String,
    pub instructions: String,
    pub priority: Priority,
    pub estimated_hours: f64,
    pub is_subtask: bool,
    pub parent_task_id: Option<String>,
}

/// Returned in place of an assignment when no task is currently assignable
/// (spec.md §4.5.1 step 11). A success response, not an error — "no task
/// available" carries a retry hint rather than failing the call.
#[derive(Debug, Clone)]
pub struct NoTaskResponse {
    pub retry_after_seconds: u64,
    pub retry_reason: String,
    pub blocking_task_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RequestNextTaskOutcome {
    Assigned(AssignedTask),
    NoTask(NoTaskResponse),
}

#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub id: String,
    pub agent_id: String,
    pub decision: String,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub path: String,
    pub artifact_type: String,
    pub logged_at: DateTime<Utc>,
}

/// Everything `get_task_context` assembles for a requesting agent (spec.md
/// §6 `get_task_context`).
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task: Task,
    pub parent_task: Option<Task>,
    pub dependent_tasks: Vec<Task>,
    pub decisions: Vec<DecisionRecord>,
    pub artifacts: Vec<ArtifactRecord>,
}

/// The central scheduler (spec.md §4.5). Owns no state storage of its own
/// beyond the reservation set and the context/decision logs — task data
/// lives in `TaskStore`, assignments in `AssignmentPersistence`, leases in
/// `LeaseManager`, and agents in `AgentRegistry`. `AssignmentEngine` wires
/// them together under the assignment lock (spec.md §5).
pub struct AssignmentEngine {
    store: Arc<TaskStore>,
    kanban: Arc<dyn KanbanProvider>,
    persistence: Arc<AssignmentPersistence>,
    lease: Arc<LeaseManager>,
    registry: Arc<AgentRegistry>,
    ai: Arc<dyn InstructionEngine>,
    config: Config,
    reservation_set: Mutex<HashSet<String>>,
    assignment_lock: Mutex<()>,
    decisions: RwLock<HashMap<String, Vec<DecisionRecord>>>,
    artifacts: RwLock<HashMap<String, Vec<ArtifactRecord>>>,
}

impl AssignmentEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<TaskStore>,
        kanban: Arc<dyn KanbanProvider>,
        persistence: Arc<AssignmentPersistence>,
        lease: Arc<LeaseManager>,
        registry: Arc<AgentRegistry>,
        ai: Arc<dyn InstructionEngine>,
        config: Config,
    ) -> Self {
        Self {
            store,
            kanban,
            persistence,
            lease,
            registry,
            ai,
            config,
            reservation_set: Mutex::new(HashSet::new()),
            assignment_lock: Mutex::new(()),
            decisions: RwLock::new(HashMap::new()),
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    async fn collect_assigned_ids(&self) -> HashSet<String> {
        let mut ids = self.persistence.get_all_assigned_task_ids().await;
        ids.extend(self.reservation_set.lock().await.iter().cloned());
        ids
    }

    /// spec.md §4.5.1 `RequestNextTask`.
    pub async fn request_next_task(&self, agent_id: &str) -> Result<RequestNextTaskOutcome> {
        self.store.refresh().await?;
        self.registry.require_idle(agent_id).await?;

        let claim = {
            let _guard = self.assignment_lock.lock().await;

            let assigned_ids = self.collect_assigned_ids().await;
            let all_tasks = self.store.all().await;
            let candidates =
                filters::filter_pipeline(&all_tasks, &assigned_ids, &self.config.project_success);

            if candidates.is_empty() {
                let hint = self.compute_retry_hint(&all_tasks).await;
                return Ok(RequestNextTaskOutcome::NoTask(hint));
            }

            let agent = self
                .registry
                .get(agent_id)
                .await
                .ok_or_else(|| MarcusError::AgentNotRegistered {
                    agent_id: agent_id.to_string(),
                })?;
            let winner = scoring::best_candidate(&candidates, &agent, &self.config.scoring)
                .cloned()
                .expect("candidates is non-empty");

            self.reservation_set.lock().await.insert(winner.id.clone());
            winner
        };

        match self.commit_assignment(agent_id, &claim).await {
            Ok(assigned) => Ok(RequestNextTaskOutcome::Assigned(assigned)),
            Err(e) => {
                self.reservation_set.lock().await.remove(&claim.id);
                Err(e)
            }
        }
    }

    /// spec.md §4.5.1 step 9: commit kanban write, then AP/LM/AR. If the
    /// kanban write itself fails, no AP/LM/AR state has been touched — the
    /// caller's reservation removal is the only rollback needed. If a later
    /// step fails, we best-effort revert the kanban write so it doesn't
    /// silently disagree with an engine that thinks nothing was assigned.
    async fn commit_assignment(&self, agent_id: &str, task: &Task) -> Result<AssignedTask> {
        self.kanban
            .update_task(
                &task.id,
                TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    assigned_to: Some(Some(agent_id.to_string())),
                    progress: None,
                },
            )
            .await?;

        match self.finish_commit(agent_id, task).await {
            Ok(assigned) => Ok(assigned),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "commit failed after kanban write; reverting");
                let _ = self
                    .kanban
                    .update_task(
                        &task.id,
                        TaskUpdate {
                            status: Some(TaskStatus::Todo),
                            assigned_to: Some(None),
                            progress: None,
                        },
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn finish_commit(&self, agent_id: &str, task: &Task) -> Result<AssignedTask> {
        let assignment = Assignment {
            agent_id: agent_id.to_string(),
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            priority: task.priority,
            estimated_hours: task.estimated_hours,
            assigned_at: Utc::now(),
        };
        self.persistence.save(agent_id, assignment).await?;

        let lease = self
            .lease
            .create(&task.id, agent_id, task.priority, task.estimated_hours)
            .await;
        self.registry.set_current(agent_id, task).await?;

        let mut committed = task.clone();
        committed.status = TaskStatus::InProgress;
        committed.assigned_to = Some(agent_id.to_string());
        self.store.put(committed.clone()).await;

        self.reservation_set.lock().await.remove(&task.id);

        let context = self.build_instruction_context(&committed).await;
        let instructions = self.ai.generate_instructions(&committed, &context).await;

        info!(
            task_id = %task.id,
            agent_id,
            lease_expires = %lease.lease_expires,
            "assignment committed"
        );

        Ok(AssignedTask {
            task_id: committed.id,
            name: committed.name,
            instructions,
            priority: committed.priority,
            estimated_hours: committed.estimated_hours,
            is_subtask: committed.is_subtask,
            parent_task_id: committed.parent_task_id,
        })
    }

    async fn build_instruction_context(&self, task: &Task) -> InstructionContext {
        let parent_task = match &task.parent_task_id {
            Some(parent_id) => self.store.get(parent_id).await,
            None => None,
        };
        let all_tasks = self.store.all().await;
        let downstream_dependents = all_tasks
            .iter()
            .filter(|t| t.dependencies.contains(&task.id))
            .count();

        InstructionContext {
            parent_task,
            dependency_count: task.dependencies.len(),
            downstream_dependents,
        }
    }

    async fn compute_retry_hint(&self, all_tasks: &[Task]) -> NoTaskResponse {
        let mut in_progress_pairs = Vec::new();
        for task in all_tasks.iter().filter(|t| t.status == TaskStatus::InProgress) {
            let Some(agent_id) = &task.assigned_to else {
                continue;
            };
            if let Some(assignment) = self.persistence.get(agent_id).await {
                if assignment.task_id == task.id {
                    in_progress_pairs.push((task.clone(), assignment));
                }
            }
        }
        let hint = retry::compute(&in_progress_pairs, &self.config.retry_after);
        NoTaskResponse {
            retry_after_seconds: hint.seconds,
            retry_reason: hint.reason,
            blocking_task_id: hint.blocking_task_id,
        }
    }

    /// spec.md §4.5.2 `ReportProgress`. All three branches are idempotent:
    /// once the agent no longer holds `task_id` the call is a no-op.
    pub async fn report_progress(
        &self,
        agent_id: &str,
        task_id: &str,
        status: ReportedStatus,
        progress: u8,
        message: Option<String>,
    ) -> Result<()> {
        let agent = self
            .registry
            .get(agent_id)
            .await
            .ok_or_else(|| MarcusError::AgentNotRegistered {
                agent_id: agent_id.to_string(),
            })?;
        if !agent.current_tasks.iter().any(|t| t == task_id) {
            debug!(agent_id, task_id, "report_progress no-op: task not currently held");
            return Ok(());
        }

        match status {
            ReportedStatus::InProgress => {
                self.kanban
                    .update_task_progress(
                        task_id,
                        ProgressUpdate {
                            progress,
                            status_message: message,
                        },
                    )
                    .await?;
                self.lease.renew(task_id, progress).await?;
                self.store.refresh().await?;
            }
            ReportedStatus::Blocked => {
                self.kanban
                    .update_task(
                        task_id,
                        TaskUpdate {
                            status: Some(TaskStatus::Blocked),
                            assigned_to: None,
                            progress: Some(progress),
                        },
                    )
                    .await?;
                self.store.refresh().await?;
            }
            ReportedStatus::Completed => {
                self.complete_task(agent_id, task_id).await?;
            }
        }
        Ok(())
    }

    async fn complete_task(&self, agent_id: &str, task_id: &str) -> Result<()> {
        self.kanban
            .update_task(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Done),
                    assigned_to: None,
                    progress: Some(100),
                },
            )
            .await?;

        if let Some(task) = self.store.get(task_id).await {
            let mut updated = task.clone();
            updated.status = TaskStatus::Done;
            updated.progress = 100;
            self.store.put(updated).await;

            if task.is_subtask {
                if let Some(parent_id) = &task.parent_task_id {
                    self.maybe_auto_complete_parent(parent_id).await?;
                }
            }
        }

        self.lease.expire(task_id).await;
        self.persistence.remove(agent_id).await?;
        self.registry.clear_current(agent_id).await?;
        self.store.refresh().await?;
        Ok(())
    }

    /// A parent auto-completes once every subtask is DONE (spec.md §4.5.2
    /// step 2). From the caller's perspective this is one atomic sequence
    /// riding on the same `complete_task` call that finished the last
    /// subtask.
    async fn maybe_auto_complete_parent(&self, parent_id: &str) -> Result<()> {
        let siblings = self.store.children(parent_id).await;
        if siblings.is_empty() || !siblings.iter().all(|s| s.status == TaskStatus::Done) {
            return Ok(());
        }

        self.kanban
            .update_task(
                parent_id,
                TaskUpdate {
                    status: Some(TaskStatus::Done),
                    assigned_to: None,
                    progress: Some(100),
                },
            )
            .await?;
        if let Some(mut parent) = self.store.get(parent_id).await {
            parent.status = TaskStatus::Done;
            parent.progress = 100;
            self.store.put(parent).await;
        }
        info!(parent_id, "parent auto-completed: all subtasks done");
        Ok(())
    }

    /// spec.md §4.5.3 `ReportBlocker`. Never fails the request once
    /// preconditions hold — kanban/comment failures are logged and
    /// swallowed, matching spec.md §7's "blocker reports never fail".
    pub async fn report_blocker(
        &self,
        agent_id: &str,
        task_id: &str,
        description: &str,
        severity: BlockerSeverity,
    ) -> Result<Vec<String>> {
        let agent = self
            .registry
            .get(agent_id)
            .await
            .ok_or_else(|| MarcusError::AgentNotRegistered {
                agent_id: agent_id.to_string(),
            })?;
        if !agent.current_tasks.iter().any(|t| t == task_id) {
            return Err(MarcusError::TaskNotAssigned(task_id.to_string()));
        }
        let task = self
            .store
            .get(task_id)
            .await
            .ok_or_else(|| MarcusError::TaskNotFound(task_id.to_string()))?;

        let suggestions = self
            .ai
            .suggest_blocker_resolution(&task, description, severity)
            .await;

        if let Err(e) = self
            .kanban
            .update_task(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Blocked),
                    assigned_to: None,
                    progress: None,
                },
            )
            .await
        {
            warn!(task_id, error = %e, "failed to mark task blocked in kanban");
        }

        let comment = format!(
            "Blocker ({severity:?}): {description}\nSuggestions:\n- {}",
            suggestions.join("\n- ")
        );
        if let Err(e) = self.kanban.add_comment(task_id, &comment).await {
            warn!(task_id, error = %e, "failed to post blocker comment");
        }
        let _ = self.store.refresh().await;

        Ok(suggestions)
    }

    /// spec.md §4.5.4 `UnassignTask`. Idempotent: calling it on a task with
    /// no current assignment is a structured error, not a mutation.
    pub async fn unassign_task(&self, task_id: &str, agent_id: Option<String>) -> Result<()> {
        let agent_id = match agent_id {
            Some(id) => id,
            None => self
                .registry
                .owner_of(task_id)
                .await
                .ok_or_else(|| MarcusError::TaskNotAssigned(task_id.to_string()))?,
        };

        let holds_it = self
            .persistence
            .get(&agent_id)
            .await
            .map(|a| a.task_id == task_id)
            .unwrap_or(false);
        if !holds_it {
            return Err(MarcusError::TaskNotAssigned(task_id.to_string()));
        }

        self.reservation_set.lock().await.remove(task_id);
        self.persistence.remove(&agent_id).await?;
        self.registry.clear_current(&agent_id).await?;
        self.lease.expire(task_id).await;
        self.kanban
            .update_task(
                task_id,
                TaskUpdate {
                    status: Some(TaskStatus::Todo),
                    assigned_to: Some(None),
                    progress: Some(0),
                },
            )
            .await?;
        self.store.refresh().await?;
        info!(task_id, agent_id, "task unassigned");
        Ok(())
    }

    /// spec.md §6 `log_decision`.
    pub async fn log_decision(&self, agent_id: &str, task_id: &str, decision: &str) -> Result<String> {
        if self.store.get(task_id).await.is_none() {
            return Err(MarcusError::TaskNotFound(task_id.to_string()));
        }
        let record = DecisionRecord {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            decision: decision.to_string(),
            logged_at: Utc::now(),
        };
        let id = record.id.clone();
        self.decisions
            .write()
            .await
            .entry(task_id.to_string())
            .or_default()
            .push(record);
        Ok(id)
    }

    /// Records a successful `log_artifact` call (spec.md §6) against its
    /// task so `get_task_context` can surface it later.
    pub async fn record_artifact(&self, task_id: &str, path: &str, artifact_type: &str) {
        self.artifacts
            .write()
            .await
            .entry(task_id.to_string())
            .or_default()
            .push(ArtifactRecord {
                path: path.to_string(),
                artifact_type: artifact_type.to_string(),
                logged_at: Utc::now(),
            });
    }

    /// spec.md §6 `get_task_context`.
    pub async fn get_task_context(&self, task_id: &str) -> Result<TaskContext> {
        let task = self
            .store
            .get(task_id)
            .await
            .ok_or_else(|| MarcusError::TaskNotFound(task_id.to_string()))?;

        let parent_task = match &task.parent_task_id {
            Some(parent_id) => self.store.get(parent_id).await,
            None => None,
        };

        let all_tasks = self.store.all().await;
        let dependent_tasks = all_tasks
            .into_iter()
            .filter(|t| t.dependencies.contains(task_id))
            .collect();

        let decisions = self
            .decisions
            .read()
            .await
            .get(task_id)
            .cloned()
            .unwrap_or_default();
        let artifacts = self
            .artifacts
            .read()
            .await
            .get(task_id)
            .cloned()
            .unwrap_or_default();

        Ok(TaskContext {
            task,
            parent_task,
            dependent_tasks,
            decisions,
            artifacts,
        })
    }
}

#[cfg(test)]
mod tests;
