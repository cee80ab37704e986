use crate::config::ScoringConfig;
use crate::models::{Agent, Task};
use std::cmp::Ordering;

/// Fraction of the task's labels the agent's skills cover (spec.md §4.5.1
/// step 7). A label-less task has nothing for an agent's skills to match,
/// so it scores `0.0` rather than dividing by zero.
pub fn skill_match(agent: &Agent, task: &Task) -> f64 {
    let denom = task.labels.len().max(1) as f64;
    let overlap = agent.skills.intersection(&task.labels).count() as f64;
    overlap / denom
}

pub fn score(agent: &Agent, task: &Task, config: &ScoringConfig) -> f64 {
    config.skill_weight * skill_match(agent, task) + config.priority_weight * task.priority.weight()
}

/// Picks the highest-scoring candidate, breaking ties by higher priority,
/// then smaller `estimated_hours`, then lexicographically smaller id (spec.md
/// §4.5.1 step 7).
pub fn best_candidate<'a>(
    candidates: &'a [Task],
    agent: &Agent,
    config: &ScoringConfig,
) -> Option<&'a Task> {
    candidates.iter().max_by(|a, b| compare_candidates(a, b, agent, config))
}

fn compare_candidates(a: &Task, b: &Task, agent: &Agent, config: &ScoringConfig) -> Ordering {
    let score_a = score(agent, a, config);
    let score_b = score(agent, b, config);
    score_a
        .partial_cmp(&score_b)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| {
            b.estimated_hours
                .partial_cmp(&a.estimated_hours)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| b.id.cmp(&a.id))
}
