use crate::models::{BlockerSeverity, Task};
use async_trait::async_trait;

/// Everything `InstructionEngine` needs beyond the task itself to produce
/// good instructions (spec.md §4.5.1 step 10).
#[derive(Debug, Clone, Default)]
pub struct InstructionContext {
    pub parent_task: Option<Task>,
    pub dependency_count: usize,
    /// Number of other tasks that list this one as a dependency — used to
    /// decide whether to prompt for an architectural-decision writeup.
    pub downstream_dependents: usize,
}

/// Pluggable AI backend for instruction generation and blocker-resolution
/// suggestions (spec.md §1 "an AI engine ... treated as pluggable
/// interfaces"). Implementations MUST NOT fail outward: a real backend
/// (an HTTP-based model client, say) must catch its own transport errors and
/// fall back to a deterministic template internally, so the assignment
/// commit path never depends on this call succeeding (spec.md §7 "Kanban and
/// AI failures during instruction generation degrade gracefully").
#[async_trait]
pub trait InstructionEngine: Send + Sync {
    async fn generate_instructions(&self, task: &Task, context: &InstructionContext) -> String;

    async fn suggest_blocker_resolution(
        &self,
        task: &Task,
        description: &str,
        severity: BlockerSeverity,
    ) -> Vec<String>;
}

/// Downstream-dependent count at or above which a task is considered
/// high-impact enough to prompt for an architectural-decision writeup.
const HIGH_IMPACT_DEPENDENT_THRESHOLD: usize = 2;

/// Deterministic fallback engine with no external dependency. Used whenever
/// no real AI backend is configured, and as the behavior any real backend
/// should degrade to on its own failure.
#[derive(Debug, Clone, Default)]
pub struct TemplateInstructionEngine;

#[async_trait]
impl InstructionEngine for TemplateInstructionEngine {
    async fn generate_instructions(&self, task: &Task, context: &InstructionContext) -> String {
        let mut lines = vec![format!("Implement: {}", task.name)];

        if !task.description.is_empty() {
            lines.push(task.description.clone());
        }

        if let Some(parent) = &context.parent_task {
            lines.push(format!(
                "This is a subtask of '{}'; keep its conventions in mind.",
                parent.name
            ));
        }

        if context.dependency_count > 0 {
            lines.push(format!(
                "All {} dependencies are complete; their outputs are available via get_task_context.",
                context.dependency_count
            ));
        }

        if context.downstream_dependents >= HIGH_IMPACT_DEPENDENT_THRESHOLD {
            lines.push(format!(
                "{} other tasks depend on this one; log any architectural decisions with log_decision.",
                context.downstream_dependents
            ));
        }

        lines.join("\n")
    }

    async fn suggest_blocker_resolution(
        &self,
        _task: &Task,
        description: &str,
        severity: BlockerSeverity,
    ) -> Vec<String> {
        let mut suggestions = vec![format!(
            "Double-check assumptions implied by: \"{description}\"."
        )];
        match severity {
            BlockerSeverity::High => {
                suggestions.push("Consider escalating to a human collaborator.".to_string());
                suggestions.push("Look for an alternative approach that avoids the blocker entirely.".to_string());
            }
            BlockerSeverity::Medium => {
                suggestions.push("Search prior decisions and artifacts for similar blockers.".to_string());
            }
            BlockerSeverity::Low => {
                suggestions.push("Try a short investigation before reporting further blockers.".to_string());
            }
        }
        suggestions
    }
}
