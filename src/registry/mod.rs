use crate::error::{MarcusError, Result};
use crate::models::{Agent, Task};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tracks registered agents and enforces the one-task-per-agent invariant
/// (spec.md §4.4). Unlike the teacher's closed `AgentType` roster, Marcus
/// agents register dynamically, so the key is an open `agent_id: String`.
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Idempotent: re-registering an already-known agent updates its
    /// name/role/skills in place but never clears `current_tasks` (spec.md
    /// §4.4).
    pub async fn register(
        &self,
        agent_id: &str,
        name: &str,
        role: &str,
        skills: HashSet<String>,
    ) -> Agent {
        let mut agents = self.agents.write().await;
        match agents.get_mut(agent_id) {
            Some(existing) => {
                existing.name = name.to_string();
                existing.role = role.to_string();
                existing.skills = skills;
                debug!(agent_id, "re-registered existing agent");
                existing.clone()
            }
            None => {
                let agent = Agent::new(agent_id, name, role, skills);
                agents.insert(agent_id.to_string(), agent.clone());
                info!(agent_id, role, "registered new agent");
                agent
            }
        }
    }

    pub async fn get(&self, agent_id: &str) -> Option<Agent> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn is_registered(&self, agent_id: &str) -> bool {
        self.agents.read().await.contains_key(agent_id)
    }

    /// Rejects if the agent already has a current task, returning its id so
    /// the caller can build an `AgentAlreadyHasTask` denial (spec.md §4.4).
    pub async fn require_idle(&self, agent_id: &str) -> Result<()> {
        let agents = self.agents.read().await;
        let agent = agents
            .get(agent_id)
            .ok_or_else(|| MarcusError::AgentNotRegistered {
                agent_id: agent_id.to_string(),
            })?;
        if let Some(task_id) = agent.current_tasks.first() {
            return Err(MarcusError::AgentAlreadyHasTask {
                agent_id: agent_id.to_string(),
                task_id: task_id.clone(),
            });
        }
        Ok(())
    }

    pub async fn set_current(&self, agent_id: &str, task: &Task) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| MarcusError::AgentNotRegistered {
                agent_id: agent_id.to_string(),
            })?;
        agent.current_tasks = vec![task.id.clone()];
        Ok(())
    }

    /// Clears the agent's current task. A no-op (not an error) if the agent
    /// has no current task, matching `UnassignTask`'s idempotent contract.
    pub async fn clear_current(&self, agent_id: &str) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| MarcusError::AgentNotRegistered {
                agent_id: agent_id.to_string(),
            })?;
        agent.current_tasks.clear();
        Ok(())
    }

    pub async fn increment_completed(&self, agent_id: &str) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| MarcusError::AgentNotRegistered {
                agent_id: agent_id.to_string(),
            })?;
        agent.completed_tasks_count += 1;
        Ok(())
    }

    pub async fn all(&self) -> Vec<Agent> {
        self.agents.read().await.values().cloned().collect()
    }

    /// Finds the agent currently holding `task_id`, used by `UnassignTask`
    /// when the caller omits the owning agent (spec.md §4.5.4).
    pub async fn owner_of(&self, task_id: &str) -> Option<String> {
        self.agents
            .read()
            .await
            .values()
            .find(|a| a.current_tasks.iter().any(|t| t == task_id))
            .map(|a| a.agent_id.clone())
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    #[tokio::test]
    async fn register_is_idempotent_and_preserves_current_tasks() {
        let registry = AgentRegistry::new();
        registry
            .register("a1", "Ada", "developer", HashSet::from(["rust".to_string()]))
            .await;

        let task = Task::new("t1", "work", Priority::Medium);
        registry.set_current("a1", &task).await.unwrap();

        registry
            .register("a1", "Ada Lovelace", "developer", HashSet::from(["rust".to_string(), "python".to_string()]))
            .await;

        let agent = registry.get("a1").await.unwrap();
        assert_eq!(agent.name, "Ada Lovelace");
        assert_eq!(agent.current_tasks, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn require_idle_rejects_agent_with_current_task() {
        let registry = AgentRegistry::new();
        registry.register("a1", "Ada", "developer", HashSet::new()).await;
        let task = Task::new("t1", "work", Priority::Medium);
        registry.set_current("a1", &task).await.unwrap();

        let err = registry.require_idle("a1").await.unwrap_err();
        assert!(matches!(err, MarcusError::AgentAlreadyHasTask { .. }));
    }

    #[tokio::test]
    async fn clear_current_is_a_noop_when_already_idle() {
        let registry = AgentRegistry::new();
        registry.register("a1", "Ada", "developer", HashSet::new()).await;
        registry.clear_current("a1").await.unwrap();
        registry.clear_current("a1").await.unwrap();
        assert!(registry.require_idle("a1").await.is_ok());
    }
}
