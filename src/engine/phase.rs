use crate::constants::{BUILD_LABELS, DEPLOY_LABELS, DESIGN_LABELS, TEST_LABELS};
use crate::models::{Phase, Task};

/// Infers a task's phase from its labels (spec.md GLOSSARY "Phase"). Tasks
/// whose labels don't match any phase bucket aren't subject to the phase
/// gate at all — `None` means "no phase opinion", not "design".
pub fn classify(task: &Task) -> Option<Phase> {
    let has_any = |labels: &[&str]| labels.iter().any(|l| task.labels.contains(*l));
    if has_any(DESIGN_LABELS) {
        Some(Phase::Design)
    } else if has_any(BUILD_LABELS) {
        Some(Phase::Build)
    } else if has_any(TEST_LABELS) {
        Some(Phase::Test)
    } else if has_any(DEPLOY_LABELS) {
        Some(Phase::Deploy)
    } else {
        None
    }
}

/// Returns a human-readable block reason if `task` is gated behind an
/// earlier phase of the same feature that has no completed representative
/// (spec.md §4.5.1 step 5, "phase gate"). Two tasks belong to the same
/// feature if they share at least one label. A phase counts as satisfied as
/// soon as *any* same-feature task of that phase is `Done` — it doesn't
/// require every task of the earlier phase to finish first.
pub fn phase_gate_reason(task: &Task, all_tasks: &[Task]) -> Option<String> {
    let phase = classify(task)?;

    let same_feature: Vec<&Task> = all_tasks
        .iter()
        .filter(|other| other.id != task.id && !task.labels.is_disjoint(&other.labels))
        .collect();

    let mut earlier_phases: Vec<Phase> = same_feature
        .iter()
        .filter_map(|other| classify(other))
        .filter(|&other_phase| other_phase < phase)
        .collect();
    earlier_phases.sort();
    earlier_phases.dedup();

    for earlier_phase in earlier_phases {
        let satisfied = same_feature
            .iter()
            .any(|other| classify(other) == Some(earlier_phase) && other.status == crate::models::TaskStatus::Done);
        if !satisfied {
            let blocker = same_feature
                .iter()
                .find(|other| classify(other) == Some(earlier_phase))
                .expect("earlier_phase was derived from same_feature");
            return Some(format!(
                "phase gate: {} phase incomplete (blocked by task {})",
                earlier_phase.as_str(),
                blocker.id
            ));
        }
    }
    None
}
