pub mod kanban;

pub use kanban::{FakeKanban, KanbanProvider, ProgressUpdate, TaskUpdate};

use crate::error::Result;
use crate::models::Task;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory snapshot of the project's tasks and subtasks (spec.md §4.1).
///
/// Parent tasks are refreshed from the kanban provider on every `refresh()`;
/// subtasks are not — the kanban board isn't required to store them, so once
/// a subtask is migrated into the store it survives refreshes until the
/// engine explicitly mutates or removes it.
pub struct TaskStore {
    kanban: Arc<dyn KanbanProvider>,
    tasks: RwLock<HashMap<String, Task>>,
}

impl TaskStore {
    pub fn new(kanban: Arc<dyn KanbanProvider>) -> Self {
        Self {
            kanban,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch parent tasks from kanban, update their mutable fields, and keep
    /// any in-memory subtasks intact (spec.md §4.1 `Refresh`).
    pub async fn refresh(&self) -> Result<()> {
        let fetched = self.kanban.get_all_tasks().await?;
        let mut tasks = self.tasks.write().await;

        let subtasks: Vec<Task> = tasks.values().filter(|t| t.is_subtask).cloned().collect();

        tasks.clear();
        for task in fetched {
            tasks.insert(task.id.clone(), task);
        }
        for subtask in subtasks {
            tasks.insert(subtask.id.clone(), subtask);
        }

        debug!(count = tasks.len(), "task store refreshed");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Task> {
        self.tasks.read().await.values().cloned().collect()
    }

    pub async fn children(&self, parent_id: &str) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.parent_task_id.as_deref() == Some(parent_id))
            .cloned()
            .collect()
    }

    /// True iff at least one subtask currently references `parent_id` (spec.md
    /// §4.1 `HasSubtasks`). A parent task is never assignable while this holds.
    pub async fn has_subtasks(&self, parent_id: &str) -> bool {
        self.tasks
            .read()
            .await
            .values()
            .any(|t| t.parent_task_id.as_deref() == Some(parent_id))
    }

    /// Insert or replace a task in the snapshot directly, bypassing kanban.
    /// Used by the engine to migrate a freshly created subtask into the store
    /// and to reflect kanban writes it already knows succeeded without an
    /// extra round trip.
    pub async fn put(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }

    pub async fn remove(&self, id: &str) {
        self.tasks.write().await.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    #[tokio::test]
    async fn refresh_preserves_in_memory_subtasks() {
        let kanban = Arc::new(FakeKanban::new());
        kanban.seed(Task::new("parent", "parent task", Priority::Medium)).await;
        let store = TaskStore::new(kanban.clone());
        store.refresh().await.unwrap();

        let mut subtask = Task::new("sub1", "subtask one", Priority::Medium);
        subtask.is_subtask = true;
        subtask.parent_task_id = Some("parent".to_string());
        store.put(subtask).await;

        store.refresh().await.unwrap();

        assert!(store.get("sub1").await.is_some());
        assert!(store.has_subtasks("parent").await);
        assert_eq!(store.children("parent").await.len(), 1);
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let kanban = Arc::new(FakeKanban::new());
        kanban.seed(Task::new("t1", "do it", Priority::High)).await;
        let store = TaskStore::new(kanban);

        store.refresh().await.unwrap();
        let first = store.all().await;
        store.refresh().await.unwrap();
        let second = store.all().await;

        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
    }
}
