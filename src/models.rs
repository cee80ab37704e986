use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Creation/update timestamps, embedded in every persistent entity instead of
/// the original's ORM timestamp mixin (spec §9, "Deep inheritance / mixins").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Timestamps {
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// Status of a task in the assignment pipeline (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Blocked,
}

/// Task priority (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// `priority_weight` term of the scoring formula (spec §4.5.1 step 7).
    pub fn weight(self) -> f64 {
        match self {
            Priority::Urgent => 1.0,
            Priority::High => 0.8,
            Priority::Medium => 0.5,
            Priority::Low => 0.2,
        }
    }

    /// `priority_multiplier` term of the lease duration formula (spec §4.3).
    pub fn lease_multiplier(self) -> f64 {
        match self {
            Priority::Urgent => 0.5,
            Priority::High => 0.75,
            Priority::Medium => 1.0,
            Priority::Low => 1.5,
        }
    }
}

/// The unit of work (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub dependencies: HashSet<String>,
    pub labels: HashSet<String>,
    pub estimated_hours: f64,
    pub progress: u8,
    pub is_subtask: bool,
    pub parent_task_id: Option<String>,
    pub subtask_index: Option<u32>,
    pub due_date: Option<chrono::DateTime<chrono::Utc>>,
    pub timestamps: Timestamps,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority,
            assigned_to: None,
            dependencies: HashSet::new(),
            labels: HashSet::new(),
            estimated_hours: 1.0,
            progress: 0,
            is_subtask: false,
            parent_task_id: None,
            subtask_index: None,
            due_date: None,
            timestamps: Timestamps::now(),
        }
    }
}

/// Skills/role/capacity profile for a worker (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
    pub role: String,
    pub skills: HashSet<String>,
    pub current_tasks: Vec<String>,
    pub completed_tasks_count: u64,
    pub performance_score: f64,
    pub capacity_hours_per_week: u32,
}

impl Agent {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        skills: HashSet<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            role: role.into(),
            skills,
            current_tasks: Vec::new(),
            completed_tasks_count: 0,
            performance_score: 1.0,
            capacity_hours_per_week: crate::constants::DEFAULT_AGENT_CAPACITY_HOURS,
        }
    }

    pub fn has_current_task(&self) -> bool {
        !self.current_tasks.is_empty()
    }
}

/// Binding of an agent to a task (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub agent_id: String,
    pub task_id: String,
    pub task_name: String,
    pub priority: Priority,
    pub estimated_hours: f64,
    pub assigned_at: chrono::DateTime<chrono::Utc>,
}

/// Liveness contract over an assignment (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub task_id: String,
    pub agent_id: String,
    pub lease_expires: chrono::DateTime<chrono::Utc>,
    pub renewal_count: u32,
    pub last_progress: u8,
    pub progress_unchanged_renewals: u32,
    pub stuck: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Reported status transitions from `report_task_progress` (spec §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    InProgress,
    Completed,
    Blocked,
}

/// Severity level for `report_blocker` (spec §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockerSeverity {
    Low,
    Medium,
    High,
}

/// Inferred work phase used by the phase gate (spec GLOSSARY).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Design,
    Build,
    Test,
    Deploy,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Design => "design",
            Phase::Build => "build",
            Phase::Test => "test",
            Phase::Deploy => "deploy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_weights_match_scoring_formula() {
        assert_eq!(Priority::Urgent.weight(), 1.0);
        assert_eq!(Priority::High.weight(), 0.8);
        assert_eq!(Priority::Medium.weight(), 0.5);
        assert_eq!(Priority::Low.weight(), 0.2);
    }

    #[test]
    fn priority_ordering_is_ascending() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Urgent);
    }

    #[test]
    fn new_task_defaults_to_todo_and_unassigned() {
        let task = Task::new("t1", "do the thing", Priority::Medium);
        assert_eq!(task.status, TaskStatus::Todo);
        assert!(task.assigned_to.is_none());
        assert!(!task.is_subtask);
    }
}
