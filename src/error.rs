use thiserror::Error;

/// Convenience type alias for Results with MarcusError
pub type Result<T> = std::result::Result<T, MarcusError>;

/// Main error type for Marcus Core
#[derive(Error, Debug)]
pub enum MarcusError {
    #[error("agent not registered: {agent_id}")]
    AgentNotRegistered { agent_id: String },

    #[error("agent {agent_id} already has task {task_id}")]
    AgentAlreadyHasTask { agent_id: String, task_id: String },

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task not assigned: {0}")]
    TaskNotAssigned(String),

    #[error("task already assigned: {task_id} -> {agent_id}")]
    TaskAlreadyAssigned { task_id: String, agent_id: String },

    #[error("kanban provider unavailable: {0}")]
    KanbanUnavailable(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
