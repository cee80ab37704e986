use crate::error::Result;
use crate::models::{Task, TaskStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Fields an `update_task` call may change. `None` means leave the field
/// untouched; `assigned_to: Some(None)` explicitly clears it (spec.md §6,
/// `UnassignTask`'s `assigned_to=null`).
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<Option<String>>,
    pub progress: Option<u8>,
}

/// Payload for `update_task_progress` — separate from `TaskUpdate` because the
/// kanban providers this crate targets expose progress reporting as its own
/// RPC, distinct from a general field patch.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub progress: u8,
    pub status_message: Option<String>,
}

/// The five kanban operations the core depends on (spec.md §6). Any board
/// backend — Planka, GitHub Projects, Linear — implements this.
#[async_trait]
pub trait KanbanProvider: Send + Sync {
    async fn get_all_tasks(&self) -> Result<Vec<Task>>;
    async fn get_task_by_id(&self, id: &str) -> Result<Option<Task>>;
    async fn update_task(&self, id: &str, fields: TaskUpdate) -> Result<()>;
    async fn update_task_progress(&self, id: &str, info: ProgressUpdate) -> Result<()>;
    async fn add_comment(&self, id: &str, text: &str) -> Result<()>;
}

/// In-memory kanban double for tests. Never used outside `#[cfg(test)]`
/// builds of dependent crates' test suites.
#[derive(Clone)]
pub struct FakeKanban {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
    comments: Arc<Mutex<HashMap<String, Vec<String>>>>,
    pub fail_next: Arc<Mutex<bool>>,
}

impl FakeKanban {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            comments: Arc::new(Mutex::new(HashMap::new())),
            fail_next: Arc::new(Mutex::new(false)),
        }
    }

    pub async fn seed(&self, task: Task) {
        self.tasks.lock().await.insert(task.id.clone(), task);
    }

    pub async fn set_fail_next(&self, fail: bool) {
        *self.fail_next.lock().await = fail;
    }

    pub async fn comments_for(&self, id: &str) -> Vec<String> {
        self.comments
            .lock()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    async fn maybe_fail(&self) -> Result<()> {
        let mut fail = self.fail_next.lock().await;
        if *fail {
            *fail = false;
            return Err(crate::error::MarcusError::KanbanUnavailable(
                "fake kanban transport failure".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for FakeKanban {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KanbanProvider for FakeKanban {
    async fn get_all_tasks(&self) -> Result<Vec<Task>> {
        self.maybe_fail().await?;
        Ok(self.tasks.lock().await.values().cloned().collect())
    }

    async fn get_task_by_id(&self, id: &str) -> Result<Option<Task>> {
        self.maybe_fail().await?;
        Ok(self.tasks.lock().await.get(id).cloned())
    }

    async fn update_task(&self, id: &str, fields: TaskUpdate) -> Result<()> {
        self.maybe_fail().await?;
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| crate::error::MarcusError::TaskNotFound(id.to_string()))?;
        if let Some(status) = fields.status {
            task.status = status;
        }
        if let Some(assigned_to) = fields.assigned_to {
            task.assigned_to = assigned_to;
        }
        if let Some(progress) = fields.progress {
            task.progress = progress;
        }
        task.timestamps.touch();
        Ok(())
    }

    async fn update_task_progress(&self, id: &str, info: ProgressUpdate) -> Result<()> {
        self.maybe_fail().await?;
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| crate::error::MarcusError::TaskNotFound(id.to_string()))?;
        task.progress = info.progress;
        task.timestamps.touch();
        if let Some(message) = info.status_message {
            drop(tasks);
            self.add_comment(id, &message).await?;
        }
        Ok(())
    }

    async fn add_comment(&self, id: &str, text: &str) -> Result<()> {
        self.maybe_fail().await?;
        self.comments
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .push(text.to_string());
        Ok(())
    }
}
