use super::*;
use crate::ai::TemplateInstructionEngine;
use crate::config::{Config, LeaseConfig, ProjectSuccessConfig, RetryConfig, ScoringConfig, TransportConfig};
use crate::models::Priority;
use crate::registry::AgentRegistry;
use crate::store::FakeKanban;
use std::collections::HashSet;
use std::path::PathBuf;

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

async fn harness(kanban: Arc<FakeKanban>) -> (AssignmentEngine, PathBuf, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let ap_path = dir.path().join("assignments.json");
    let store = Arc::new(TaskStore::new(kanban.clone()));
    let persistence = Arc::new(AssignmentPersistence::load(&ap_path).await.unwrap());
    let lease = Arc::new(LeaseManager::new(test_config().lease));
    let registry = Arc::new(AgentRegistry::new());
    let ai: Arc<dyn InstructionEngine> = Arc::new(TemplateInstructionEngine);

    let engine = AssignmentEngine::new(store, kanban, persistence, lease, registry, ai, test_config());
    (engine, ap_path, dir)
}

fn task(id: &str, priority: Priority, labels: &[&str], deps: &[&str]) -> Task {
    let mut t = Task::new(id, id, priority);
    t.labels = labels.iter().map(|s| s.to_string()).collect();
    t.dependencies = deps.iter().map(|s| s.to_string()).collect();
    t
}

fn skills(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn s1_basic_assignment_then_completion_unlocks_next_task() {
    let kanban = Arc::new(FakeKanban::new());
    kanban.seed(task("t1", Priority::Medium, &["api"], &[])).await;
    kanban.seed(task("t2", Priority::Medium, &["ui"], &["t1"])).await;
    let (engine, _path, _dir) = harness(kanban).await;

    engine.registry().register("a", "Ada", "developer", skills(&["api"])).await;

    let outcome = engine.request_next_task("a").await.unwrap();
    let assigned = match outcome {
        RequestNextTaskOutcome::Assigned(a) => a,
        _ => panic!("expected an assignment"),
    };
    assert_eq!(assigned.task_id, "t1");

    let err = engine.request_next_task("a").await.unwrap_err();
    assert!(matches!(err, MarcusError::AgentAlreadyHasTask { .. }));

    engine
        .report_progress("a", "t1", ReportedStatus::Completed, 100, None)
        .await
        .unwrap();
    assert!(engine.registry().get("a").await.unwrap().current_tasks.is_empty());

    let outcome = engine.request_next_task("a").await.unwrap();
    let assigned = match outcome {
        RequestNextTaskOutcome::Assigned(a) => a,
        _ => panic!("expected t2 to be assignable now that t1 is done"),
    };
    assert_eq!(assigned.task_id, "t2");
}

#[tokio::test]
async fn s2_dependency_gate_surfaces_blocking_task_in_retry_hint() {
    let kanban = Arc::new(FakeKanban::new());
    kanban.seed(task("t1", Priority::Medium, &[], &[])).await;
    kanban.seed(task("t2", Priority::Medium, &[], &["t1"])).await;
    let (engine, _path, _dir) = harness(kanban).await;

    engine.registry().register("a", "Ada", "developer", skills(&[])).await;
    engine.registry().register("b", "Bo", "developer", skills(&[])).await;

    let outcome = engine.request_next_task("a").await.unwrap();
    assert!(matches!(outcome, RequestNextTaskOutcome::Assigned(ref t) if t.task_id == "t1"));

    let outcome = engine.request_next_task("b").await.unwrap();
    match outcome {
        RequestNextTaskOutcome::NoTask(hint) => {
            assert!(hint.retry_after_seconds >= 30 && hint.retry_after_seconds <= 3600);
            assert_eq!(hint.blocking_task_id.as_deref(), Some("t1"));
        }
        _ => panic!("expected no task for B while t1 is still in progress"),
    }
}

#[tokio::test]
async fn s3_subtasks_are_preferred_and_parent_auto_completes() {
    let kanban = Arc::new(FakeKanban::new());
    kanban.seed(task("p", Priority::Medium, &[], &[])).await;
    let (engine, _path, _dir) = harness(kanban).await;
    engine.store().refresh().await.unwrap();

    let mut s1 = task("s1", Priority::Medium, &[], &[]);
    s1.is_subtask = true;
    s1.parent_task_id = Some("p".to_string());
    let mut s2 = task("s2", Priority::Medium, &[], &[]);
    s2.is_subtask = true;
    s2.parent_task_id = Some("p".to_string());
    engine.store().put(s1).await;
    engine.store().put(s2).await;

    engine.registry().register("a", "Ada", "developer", skills(&[])).await;
    engine.registry().register("b", "Bo", "developer", skills(&[])).await;

    let outcome = engine.request_next_task("a").await.unwrap();
    assert!(matches!(outcome, RequestNextTaskOutcome::Assigned(ref t) if t.task_id == "s1"));
    engine
        .report_progress("a", "s1", ReportedStatus::Completed, 100, None)
        .await
        .unwrap();

    let outcome = engine.request_next_task("b").await.unwrap();
    assert!(matches!(outcome, RequestNextTaskOutcome::Assigned(ref t) if t.task_id == "s2"));
    engine
        .report_progress("b", "s2", ReportedStatus::Completed, 100, None)
        .await
        .unwrap();

    let parent = engine.store().get("p").await.unwrap();
    assert_eq!(parent.status, TaskStatus::Done);
}

#[tokio::test]
async fn s4_concurrent_requests_assign_each_task_at_most_once() {
    let kanban = Arc::new(FakeKanban::new());
    kanban.seed(task("t1", Priority::Medium, &[], &[])).await;
    kanban.seed(task("t2", Priority::Medium, &[], &[])).await;
    kanban.seed(task("t3", Priority::Medium, &[], &[])).await;
    let (engine, _path, _dir) = harness(kanban).await;
    let engine = Arc::new(engine);

    for i in 0..10 {
        engine
            .registry()
            .register(&format!("agent-{i}"), "agent", "developer", skills(&[]))
            .await;
    }

    let mut handles = Vec::new();
    for i in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.request_next_task(&format!("agent-{i}")).await
        }));
    }

    let mut assigned_ids = HashSet::new();
    let mut assigned_count = 0;
    let mut no_task_count = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RequestNextTaskOutcome::Assigned(a) => {
                assert!(assigned_ids.insert(a.task_id), "task assigned twice");
                assigned_count += 1;
            }
            RequestNextTaskOutcome::NoTask(_) => no_task_count += 1,
        }
    }

    assert_eq!(assigned_count, 3);
    assert_eq!(no_task_count, 7);
}

#[tokio::test]
async fn s5_lease_expiry_allows_reassignment_after_reclaim() {
    let kanban = Arc::new(FakeKanban::new());
    kanban.seed(task("t1", Priority::Medium, &[], &[])).await;
    let dir = tempfile::tempdir().unwrap();
    let ap_path = dir.path().join("assignments.json");
    let store = Arc::new(TaskStore::new(kanban.clone()));
    let persistence = Arc::new(AssignmentPersistence::load(&ap_path).await.unwrap());

    // A near-zero min lease makes the lease expire almost immediately,
    // standing in for "A crashes, time passes" without a real wait.
    let mut config = test_config();
    config.lease.default_hours = 0.0000005;
    config.lease.min_lease_hours = 0.0000005;
    config.lease.max_lease_hours = 0.0000005;
    let lease = Arc::new(LeaseManager::new(config.lease.clone()));
    let registry = Arc::new(AgentRegistry::new());
    let ai: Arc<dyn InstructionEngine> = Arc::new(TemplateInstructionEngine);
    let engine = AssignmentEngine::new(store, kanban.clone(), persistence, lease.clone(), registry, ai, config);

    engine.registry().register("a", "Ada", "developer", skills(&[])).await;
    let outcome = engine.request_next_task("a").await.unwrap();
    assert!(matches!(outcome, RequestNextTaskOutcome::Assigned(ref t) if t.task_id == "t1"));

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert!(lease.expired_task_ids().await.contains(&"t1".to_string()));

    // MON's reclaim path: expired lease -> UnassignTask.
    engine.unassign_task("t1", None).await.unwrap();

    assert!(lease.get("t1").await.is_none());
    let task = kanban.get_task_by_id("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Todo);
    assert!(task.assigned_to.is_none());

    engine.registry().register("b", "Bo", "developer", skills(&[])).await;
    let outcome = engine.request_next_task("b").await.unwrap();
    assert!(matches!(outcome, RequestNextTaskOutcome::Assigned(ref t) if t.task_id == "t1"));
}

#[tokio::test]
async fn s6_phase_gate_blocks_until_earlier_phase_completes() {
    let kanban = Arc::new(FakeKanban::new());
    let mut design = task("td", Priority::Medium, &["auth", "design"], &[]);
    design.status = TaskStatus::InProgress;
    design.assigned_to = Some("other-agent".to_string());
    kanban.seed(design).await;
    kanban.seed(task("tb", Priority::Medium, &["auth", "feature"], &[])).await;
    let (engine, _path, _dir) = harness(kanban.clone()).await;

    engine.registry().register("a", "Ada", "developer", skills(&[])).await;
    let outcome = engine.request_next_task("a").await.unwrap();
    assert!(matches!(outcome, RequestNextTaskOutcome::NoTask(_)));

    let mut td = kanban.get_task_by_id("td").await.unwrap().unwrap();
    td.status = TaskStatus::Done;
    kanban.seed(td).await;

    let outcome = engine.request_next_task("a").await.unwrap();
    assert!(matches!(outcome, RequestNextTaskOutcome::Assigned(ref t) if t.task_id == "tb"));
}

#[tokio::test]
async fn report_progress_is_idempotent_after_completion() {
    let kanban = Arc::new(FakeKanban::new());
    kanban.seed(task("t1", Priority::Medium, &[], &[])).await;
    let (engine, _path, _dir) = harness(kanban).await;
    engine.registry().register("a", "Ada", "developer", skills(&[])).await;
    engine.request_next_task("a").await.unwrap();

    engine
        .report_progress("a", "t1", ReportedStatus::Completed, 100, None)
        .await
        .unwrap();
    // Second completion report for the same task is a no-op, not an error.
    engine
        .report_progress("a", "t1", ReportedStatus::Completed, 100, None)
        .await
        .unwrap();
    assert!(engine.registry().get("a").await.unwrap().current_tasks.is_empty());
}

#[tokio::test]
async fn unassign_task_twice_returns_not_assigned_without_side_effects() {
    let kanban = Arc::new(FakeKanban::new());
    kanban.seed(task("t1", Priority::Medium, &[], &[])).await;
    let (engine, _path, _dir) = harness(kanban).await;
    engine.registry().register("a", "Ada", "developer", skills(&[])).await;
    engine.request_next_task("a").await.unwrap();

    engine.unassign_task("t1", Some("a".to_string())).await.unwrap();
    let err = engine.unassign_task("t1", Some("a".to_string())).await.unwrap_err();
    assert!(matches!(err, MarcusError::TaskNotAssigned(_)));
}

#[tokio::test]
async fn report_blocker_retains_assignment_and_returns_suggestions() {
    let kanban = Arc::new(FakeKanban::new());
    kanban.seed(task("t1", Priority::Medium, &[], &[])).await;
    let (engine, _path, _dir) = harness(kanban.clone()).await;
    engine.registry().register("a", "Ada", "developer", skills(&[])).await;
    engine.request_next_task("a").await.unwrap();

    let suggestions = engine
        .report_blocker("a", "t1", "can't reach the database", BlockerSeverity::High)
        .await
        .unwrap();
    assert!(!suggestions.is_empty());

    let task = kanban.get_task_by_id("t1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Blocked);
    assert!(engine
        .registry()
        .get("a")
        .await
        .unwrap()
        .current_tasks
        .contains(&"t1".to_string()));
}

#[tokio::test]
async fn log_decision_and_get_task_context_round_trip() {
    let kanban = Arc::new(FakeKanban::new());
    kanban.seed(task("t1", Priority::Medium, &[], &[])).await;
    let (engine, _path, _dir) = harness(kanban).await;

    let id = engine.log_decision("a", "t1", "use JWT for auth").await.unwrap();
    assert!(!id.is_empty());

    let context = engine.get_task_context("t1").await.unwrap();
    assert_eq!(context.decisions.len(), 1);
    assert_eq!(context.decisions[0].decision, "use JWT for auth");
}
