//! The seven agent-facing tools (spec.md §6), dispatched identically whether
//! the call arrived over HTTP or a stdio JSON-lines loop. Every tool returns
//! a `serde_json::Value` shaped `{"success": bool, ...}` — "no task
//! available" and similar denials are themselves `success: true` responses
//! (spec.md §7), never HTTP/JSON errors.

use crate::ai::InstructionEngine;
use crate::artifact;
use crate::engine::{AssignmentEngine, RequestNextTaskOutcome};
use crate::error::MarcusError;
use crate::models::{BlockerSeverity, ReportedStatus};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AssignmentEngine>,
}

fn error_response(err: &MarcusError) -> Value {
    json!({
        "success": false,
        "error": err.to_string(),
        "code": error_code(err),
    })
}

fn error_code(err: &MarcusError) -> &'static str {
    match err {
        MarcusError::AgentNotRegistered { .. } => "AgentNotRegistered",
        MarcusError::AgentAlreadyHasTask { .. } => "AgentAlreadyHasTask",
        MarcusError::TaskNotFound(_) => "TaskNotFound",
        MarcusError::TaskNotAssigned(_) => "TaskNotAssigned",
        MarcusError::TaskAlreadyAssigned { .. } => "TaskAlreadyAssigned",
        MarcusError::KanbanUnavailable(_) => "KanbanUnavailable",
        MarcusError::ConfigurationError(_) => "ConfigurationError",
        MarcusError::Unauthorized => "Unauthorized",
        _ => "Internal",
    }
}

/// Dispatches a single tool call by name. Unknown tool names are a
/// structured error (spec.md §6 "Access-denied and unknown-tool responses
/// are structured errors"), not an HTTP-level 404.
pub async fn dispatch(state: &AppState, tool: &str, params: Value) -> Value {
    let result = match tool {
        "register_agent" => register_agent(state, params).await,
        "request_next_task" => request_next_task(state, params).await,
        "report_task_progress" => report_task_progress(state, params).await,
        "report_blocker" => report_blocker(state, params).await,
        "get_task_context" => get_task_context(state, params).await,
        "log_decision" => log_decision(state, params).await,
        "log_artifact" => log_artifact(state, params).await,
        other => {
            return json!({
                "success": false,
                "error": format!("unknown tool: {other}"),
                "code": "UnknownTool",
            })
        }
    };
    result.unwrap_or_else(|e| error_response(&e))
}

#[derive(Deserialize)]
struct RegisterAgentParams {
    agent_id: String,
    name: String,
    role: String,
    #[serde(default)]
    skills: Vec<String>,
}

async fn register_agent(state: &AppState, params: Value) -> Result<Value, MarcusError> {
    let params: RegisterAgentParams =
        serde_json::from_value(params).map_err(|e| MarcusError::Validation(e.to_string()))?;
    let skills: HashSet<String> = params.skills.into_iter().collect();
    state
        .engine
        .registry()
        .register(&params.agent_id, &params.name, &params.role, skills)
        .await;
    Ok(json!({"success": true, "agent_id": params.agent_id}))
}

#[derive(Deserialize)]
struct RequestNextTaskParams {
    agent_id: String,
}

async fn request_next_task(state: &AppState, params: Value) -> Result<Value, MarcusError> {
    let params: RequestNextTaskParams =
        serde_json::from_value(params).map_err(|e| MarcusError::Validation(e.to_string()))?;
    match state.engine.request_next_task(&params.agent_id).await? {
        RequestNextTaskOutcome::Assigned(task) => Ok(json!({
            "success": true,
            "task": {
                "id": task.task_id,
                "name": task.name,
                "instructions": task.instructions,
                "priority": task.priority,
                "estimated_hours": task.estimated_hours,
                "is_subtask": task.is_subtask,
                "parent_task_id": task.parent_task_id,
            },
        })),
        RequestNextTaskOutcome::NoTask(hint) => Ok(json!({
            "success": false,
            "retry_after_seconds": hint.retry_after_seconds,
            "retry_reason": hint.retry_reason,
            "blocking_task": hint.blocking_task_id.map(|id| json!({"id": id})),
        })),
    }
}

#[derive(Deserialize)]
struct ReportProgressParams {
    agent_id: String,
    task_id: String,
    status: ReportedStatus,
    #[serde(default)]
    progress: u8,
    #[serde(default)]
    message: Option<String>,
}

async fn report_task_progress(state: &AppState, params: Value) -> Result<Value, MarcusError> {
    let params: ReportProgressParams =
        serde_json::from_value(params).map_err(|e| MarcusError::Validation(e.to_string()))?;
    state
        .engine
        .report_progress(
            &params.agent_id,
            &params.task_id,
            params.status,
            params.progress,
            params.message,
        )
        .await?;
    Ok(json!({"success": true}))
}

#[derive(Deserialize)]
struct ReportBlockerParams {
    agent_id: String,
    task_id: String,
    description: String,
    severity: BlockerSeverity,
}

async fn report_blocker(state: &AppState, params: Value) -> Result<Value, MarcusError> {
    let params: ReportBlockerParams =
        serde_json::from_value(params).map_err(|e| MarcusError::Validation(e.to_string()))?;
    let suggestions = state
        .engine
        .report_blocker(&params.agent_id, &params.task_id, &params.description, params.severity)
        .await?;
    Ok(json!({"success": true, "suggestions": suggestions}))
}

#[derive(Deserialize)]
struct GetTaskContextParams {
    task_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    project_root: Option<String>,
}

async fn get_task_context(state: &AppState, params: Value) -> Result<Value, MarcusError> {
    let params: GetTaskContextParams =
        serde_json::from_value(params).map_err(|e| MarcusError::Validation(e.to_string()))?;
    let context = state.engine.get_task_context(&params.task_id).await?;
    Ok(json!({
        "success": true,
        "context": {
            "is_subtask": context.task.is_subtask,
            "parent_task": context.parent_task.map(|t| json!({"id": t.id, "name": t.name})),
            "dependent_tasks": context.dependent_tasks.iter().map(|t| json!({"id": t.id, "name": t.name})).collect::<Vec<_>>(),
            "decisions": context.decisions.iter().map(|d| json!({
                "id": d.id, "agent_id": d.agent_id, "decision": d.decision, "logged_at": d.logged_at,
            })).collect::<Vec<_>>(),
            "artifacts": context.artifacts.iter().map(|a| json!({
                "path": a.path, "artifact_type": a.artifact_type, "logged_at": a.logged_at,
            })).collect::<Vec<_>>(),
        },
    }))
}

#[derive(Deserialize)]
struct LogDecisionParams {
    agent_id: String,
    task_id: String,
    decision: String,
}

async fn log_decision(state: &AppState, params: Value) -> Result<Value, MarcusError> {
    let params: LogDecisionParams =
        serde_json::from_value(params).map_err(|e| MarcusError::Validation(e.to_string()))?;
    let decision_id = state
        .engine
        .log_decision(&params.agent_id, &params.task_id, &params.decision)
        .await?;
    Ok(json!({"success": true, "decision_id": decision_id}))
}

#[derive(Deserialize)]
struct LogArtifactParams {
    task_id: String,
    filename: String,
    content: String,
    artifact_type: String,
    project_root: String,
    #[serde(default)]
    #[allow(dead_code)]
    description: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    location: Option<String>,
}

async fn log_artifact(state: &AppState, params: Value) -> Result<Value, MarcusError> {
    let params: LogArtifactParams =
        serde_json::from_value(params).map_err(|e| MarcusError::Validation(e.to_string()))?;
    let path = artifact::log_artifact(
        Path::new(&params.project_root),
        &params.filename,
        &params.content,
        &params.artifact_type,
    )
    .await?;
    state
        .engine
        .record_artifact(&params.task_id, &path.to_string_lossy(), &params.artifact_type)
        .await;
    Ok(json!({"success": true, "path": path.to_string_lossy()}))
}

/// Trait object helper so `dispatch` can be exercised without an AI backend
/// plugged in directly; kept here rather than in `ai` since it's only the
/// transport layer's concern which engine it wires up.
pub fn noop_ai() -> Arc<dyn InstructionEngine> {
    Arc::new(crate::ai::TemplateInstructionEngine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LeaseConfig, ProjectSuccessConfig, RetryConfig, ScoringConfig, TransportConfig};
    use crate::lease::LeaseManager;
    use crate::models::{Priority, Task};
    use crate::persistence::AssignmentPersistence;
    use crate::registry::AgentRegistry;
    use crate::store::{FakeKanban, TaskStore};

    fn test_config() -> Config {
        Config {
            lease: LeaseConfig {
                default_hours: 2.0,
                max_renewals: 10,
                warning_hours: 0.5,
                grace_period_minutes: 30,
                renewal_decay_factor: 0.9,
                min_lease_hours: 1.0,
                max_lease_hours: 24.0,
                stuck_threshold_renewals: 5,
                enable_adaptive: true,
            },
            scoring: ScoringConfig {
                skill_weight: 0.6,
                priority_weight: 0.4,
            },
            retry_after: RetryConfig {
                floor_seconds: 30,
                cap_seconds: 3600,
                buffer_fraction: 0.10,
                fallback_hours: 1.0,
            },
            project_success: ProjectSuccessConfig {
                completion_threshold: 0.90,
            },
            transport: TransportConfig {
                host: "127.0.0.1".to_string(),
                port: 8745,
                api_key: None,
                enable_auth: false,
            },
            state_dir: "./marcus_state_test".to_string(),
        }
    }

    async fn test_state() -> (AppState, tempfile::TempDir) {
        let kanban = Arc::new(FakeKanban::new());
        kanban.seed(Task::new("t1", "do it", Priority::Medium)).await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TaskStore::new(kanban.clone()));
        let persistence = Arc::new(
            AssignmentPersistence::load(dir.path().join("assignments.json"))
                .await
                .unwrap(),
        );
        let lease = Arc::new(LeaseManager::new(test_config().lease));
        let registry = Arc::new(AgentRegistry::new());
        let engine = Arc::new(AssignmentEngine::new(
            store, kanban, persistence, lease, registry, noop_ai(), test_config(),
        ));
        (AppState { engine }, dir)
    }

    #[tokio::test]
    async fn register_then_request_next_task_round_trips() {
        let (state, _dir) = test_state().await;
        let registered = dispatch(
            &state,
            "register_agent",
            json!({"agent_id": "a1", "name": "Ada", "role": "developer", "skills": ["api"]}),
        )
        .await;
        assert_eq!(registered["success"], true);

        let assigned = dispatch(&state, "request_next_task", json!({"agent_id": "a1"})).await;
        assert_eq!(assigned["success"], true);
        assert_eq!(assigned["task"]["id"], "t1");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_structured_error() {
        let (state, _dir) = test_state().await;
        let response = dispatch(&state, "delete_everything", json!({})).await;
        assert_eq!(response["success"], false);
        assert_eq!(response["code"], "UnknownTool");
    }

    #[tokio::test]
    async fn malformed_params_are_a_validation_error() {
        let (state, _dir) = test_state().await;
        let response = dispatch(&state, "register_agent", json!({"agent_id": 5})).await;
        assert_eq!(response["success"], false);
    }
}
