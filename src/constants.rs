//! System-wide constants not exposed through `Config`.

/// Monitor loop base unit: lease/assignment monitors poll every
/// `warning_threshold_hours / 4` by default (spec §4.6); this is the floor on
/// that derived interval so a misconfigured near-zero warning threshold can't
/// spin the monitor loops.
pub const MIN_MONITOR_POLL_SECS: u64 = 5;

/// Labels that classify a task into the `design` phase.
pub const DESIGN_LABELS: &[&str] = &["design", "architecture", "spec", "planning"];
/// Labels that classify a task into the `build` phase.
pub const BUILD_LABELS: &[&str] = &["build", "implementation", "feature", "backend", "frontend"];
/// Labels that classify a task into the `test` phase.
pub const TEST_LABELS: &[&str] = &["test", "testing", "qa", "verification"];
/// Labels that classify a task into the `deploy` phase.
pub const DEPLOY_LABELS: &[&str] = &["deploy", "deployment", "release", "rollout"];

/// Keyword list for deployment-task deprioritization (spec §4.5.1), taken
/// verbatim from the original implementation's `deployment_keywords`.
pub const DEPLOYMENT_KEYWORDS: &[&str] =
    &["deploy", "release", "production", "launch", "rollout"];

/// Explicit label that short-circuits the deployment keyword heuristic
/// (Open Question 4 in spec §9).
pub const DEPLOYMENT_LABEL: &str = "deployment";

/// Labels treated as "final/verification documentation" for the
/// project-success gate (spec §4.5.1).
pub const PROJECT_SUCCESS_LABELS: &[&str] = &["documentation", "final", "verification"];

/// Substring match on task name that also counts as a project-success task,
/// matching the original implementation's `"PROJECT_SUCCESS" in task.name`.
pub const PROJECT_SUCCESS_NAME_MARKER: &str = "PROJECT_SUCCESS";

/// Default agent weekly capacity in hours, carried over from the original
/// `register_agent` tool's `capacity=40` default.
pub const DEFAULT_AGENT_CAPACITY_HOURS: u32 = 40;

/// Complexity buckets for the lease duration formula's
/// `complexity_multiplier[estimate_bucket(task.estimated_hours)]` term
/// (spec §4.3). The formula names the bucketing function but not its
/// thresholds; these follow the same coarse small/medium/large/xlarge split
/// the original's priority/complexity multipliers otherwise assume.
pub const COMPLEXITY_SMALL_MAX_HOURS: f64 = 2.0;
pub const COMPLEXITY_MEDIUM_MAX_HOURS: f64 = 8.0;
pub const COMPLEXITY_LARGE_MAX_HOURS: f64 = 24.0;

pub const COMPLEXITY_MULTIPLIER_SMALL: f64 = 0.5;
pub const COMPLEXITY_MULTIPLIER_MEDIUM: f64 = 1.0;
pub const COMPLEXITY_MULTIPLIER_LARGE: f64 = 1.5;
pub const COMPLEXITY_MULTIPLIER_XLARGE: f64 = 2.0;
