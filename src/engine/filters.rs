use super::phase;
use crate::config::ProjectSuccessConfig;
use crate::constants::{DEPLOYMENT_KEYWORDS, DEPLOYMENT_LABEL, PROJECT_SUCCESS_LABELS, PROJECT_SUCCESS_NAME_MARKER};
use crate::models::{Task, TaskStatus};
use std::collections::{HashMap, HashSet};

/// DFS-with-recursion-stack cycle detection over the dependency graph
/// (spec.md §9 "Cyclic graphs"). Every task id participating in a cycle is
/// returned; none of them are ever assignable until the cycle is broken
/// externally.
pub fn detect_cycles(tasks: &[Task]) -> HashSet<String> {
    let deps: HashMap<String, Vec<String>> = tasks
        .iter()
        .map(|t| (t.id.clone(), t.dependencies.iter().cloned().collect()))
        .collect();

    let mut state: HashMap<String, u8> = HashMap::new();
    let mut in_cycle = HashSet::new();
    let mut stack: Vec<String> = Vec::new();

    fn visit(
        id: &str,
        deps: &HashMap<String, Vec<String>>,
        state: &mut HashMap<String, u8>,
        stack: &mut Vec<String>,
        in_cycle: &mut HashSet<String>,
    ) {
        match state.get(id).copied().unwrap_or(0) {
            2 => return,
            1 => {
                if let Some(pos) = stack.iter().position(|s| s == id) {
                    for node in &stack[pos..] {
                        in_cycle.insert(node.clone());
                    }
                }
                return;
            }
            _ => {}
        }
        state.insert(id.to_string(), 1);
        stack.push(id.to_string());
        if let Some(children) = deps.get(id) {
            for child in children {
                visit(child, deps, state, stack, in_cycle);
            }
        }
        stack.pop();
        state.insert(id.to_string(), 2);
    }

    let ids: Vec<String> = deps.keys().cloned().collect();
    for id in ids {
        if state.get(&id).copied().unwrap_or(0) == 0 {
            visit(&id, &deps, &mut state, &mut stack, &mut in_cycle);
        }
    }
    in_cycle
}

/// True for any task with at least one subtask referencing it — a parent
/// task is never assignable directly (spec.md §3).
pub fn parents_with_subtasks(tasks: &[Task]) -> HashSet<String> {
    tasks
        .iter()
        .filter(|t| t.is_subtask)
        .filter_map(|t| t.parent_task_id.clone())
        .collect()
}

/// Deployment-labeled or deployment-keyword-matching tasks are set aside
/// until no other work remains (spec.md §4.5.1 step 5, "deployment
/// deprioritization"). An explicit `deployment` label always counts;
/// otherwise name and labels are scanned case-insensitively for the keyword
/// list carried over from the original implementation (DESIGN.md §9
/// decision 4).
pub fn is_deployment_task(task: &Task) -> bool {
    if task.labels.contains(DEPLOYMENT_LABEL) {
        return true;
    }
    let name_lower = task.name.to_lowercase();
    let name_hit = DEPLOYMENT_KEYWORDS.iter().any(|k| name_lower.contains(k));
    let label_hit = task.labels.iter().any(|label| {
        let label_lower = label.to_lowercase();
        DEPLOYMENT_KEYWORDS.iter().any(|k| label_lower.contains(k))
    });
    name_hit || label_hit
}

/// True for tasks treated as final/verification project-success markers
/// (spec.md §4.5.1 step 5). Mirrors the original's dual name-substring and
/// label check (DESIGN.md "Supplemented features").
pub fn is_project_success_task(task: &Task) -> bool {
    task.name.contains(PROJECT_SUCCESS_NAME_MARKER)
        || task
            .labels
            .iter()
            .any(|l| PROJECT_SUCCESS_LABELS.contains(&l.as_str()))
}

/// True if `task` should be excluded by the project-success gate: it's a
/// success-marker task and fewer than `completion_threshold` of the
/// non-marker tasks are DONE yet.
pub fn project_success_gate_blocks(
    task: &Task,
    all_tasks: &[Task],
    config: &ProjectSuccessConfig,
) -> bool {
    if !is_project_success_task(task) {
        return false;
    }
    let non_marker: Vec<&Task> = all_tasks.iter().filter(|t| !is_project_success_task(t)).collect();
    if non_marker.is_empty() {
        return false;
    }
    let done = non_marker.iter().filter(|t| t.status == TaskStatus::Done).count();
    let completion = done as f64 / non_marker.len() as f64;
    completion < config.completion_threshold
}

/// Runs the full filter pipeline of spec.md §4.5.1 steps 5-6 over the task
/// snapshot, returning the surviving candidate set in no particular order.
/// Pure and synchronous by design — it's meant to run under the assignment
/// lock without suspending (spec.md §5).
pub fn filter_pipeline(
    all_tasks: &[Task],
    assigned_ids: &HashSet<String>,
    project_success: &ProjectSuccessConfig,
) -> Vec<Task> {
    let cycle_ids = detect_cycles(all_tasks);
    let parents = parents_with_subtasks(all_tasks);
    let completed_ids: HashSet<&str> = all_tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .map(|t| t.id.as_str())
        .collect();

    let mut candidates: Vec<Task> = all_tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Todo)
        .filter(|t| !assigned_ids.contains(&t.id))
        .filter(|t| !parents.contains(&t.id))
        .filter(|t| !cycle_ids.contains(&t.id))
        .filter(|t| t.dependencies.iter().all(|d| completed_ids.contains(d.as_str())))
        .filter(|t| !project_success_gate_blocks(t, all_tasks, project_success))
        .filter(|t| phase::phase_gate_reason(t, all_tasks).is_none())
        .cloned()
        .collect();

    // Subtask preference: spec.md §4.5.1 step 6.
    if candidates.iter().any(|t| t.is_subtask) {
        candidates.retain(|t| t.is_subtask);
    }

    // Deployment deprioritization: spec.md §4.5.1 step 5.
    if candidates.iter().any(|t| !is_deployment_task(t)) {
        candidates.retain(|t| !is_deployment_task(t));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;

    fn task(id: &str, status: TaskStatus, deps: &[&str]) -> Task {
        let mut t = Task::new(id, id, Priority::Medium);
        t.status = status;
        t.dependencies = deps.iter().map(|s| s.to_string()).collect();
        t
    }

    fn psc() -> ProjectSuccessConfig {
        ProjectSuccessConfig {
            completion_threshold: 0.90,
        }
    }

    #[test]
    fn detects_a_simple_cycle() {
        let a = task("a", TaskStatus::Todo, &["b"]);
        let b = task("b", TaskStatus::Todo, &["a"]);
        let cycle = detect_cycles(&[a, b]);
        assert!(cycle.contains("a"));
        assert!(cycle.contains("b"));
    }

    #[test]
    fn acyclic_graph_has_no_cycle_members() {
        let a = task("a", TaskStatus::Todo, &[]);
        let b = task("b", TaskStatus::Todo, &["a"]);
        assert!(detect_cycles(&[a, b]).is_empty());
    }

    #[test]
    fn dependency_gate_excludes_tasks_with_incomplete_deps() {
        let t1 = task("t1", TaskStatus::Todo, &[]);
        let t2 = task("t2", TaskStatus::Todo, &["t1"]);
        let candidates = filter_pipeline(&[t1, t2], &HashSet::new(), &psc());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "t1");
    }

    #[test]
    fn parent_with_subtasks_is_never_a_candidate() {
        let parent = task("p", TaskStatus::Todo, &[]);
        let mut sub = task("s1", TaskStatus::Todo, &[]);
        sub.is_subtask = true;
        sub.parent_task_id = Some("p".to_string());
        let candidates = filter_pipeline(&[parent, sub], &HashSet::new(), &psc());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "s1");
    }

    #[test]
    fn deployment_tasks_set_aside_while_other_work_exists() {
        let mut deploy = task("deploy-1", TaskStatus::Todo, &[]);
        deploy.name = "deploy to production".to_string();
        let other = task("t1", TaskStatus::Todo, &[]);
        let candidates = filter_pipeline(&[deploy, other], &HashSet::new(), &psc());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "t1");
    }

    #[test]
    fn deployment_tasks_considered_when_nothing_else_remains() {
        let mut deploy = task("deploy-1", TaskStatus::Todo, &[]);
        deploy.name = "deploy to production".to_string();
        let candidates = filter_pipeline(&[deploy], &HashSet::new(), &psc());
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn project_success_gate_blocks_until_threshold_met() {
        let mut success = task("final", TaskStatus::Todo, &[]);
        success.name = "PROJECT_SUCCESS review".to_string();
        let work = task("t1", TaskStatus::Todo, &[]);
        let candidates = filter_pipeline(&[success, work], &HashSet::new(), &psc());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "t1");
    }

    #[test]
    fn project_success_gate_allows_when_only_marker_tasks_remain() {
        let mut success = task("final", TaskStatus::Todo, &[]);
        success.name = "PROJECT_SUCCESS review".to_string();
        let mut done = task("t1", TaskStatus::Done, &[]);
        done.progress = 100;
        let candidates = filter_pipeline(&[success, done], &HashSet::new(), &psc());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "final");
    }
}
