use crate::error::{MarcusError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Top-level configuration, loaded once at startup from `MARCUS_`-prefixed
/// environment variables (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub lease: LeaseConfig,
    pub scoring: ScoringConfig,
    pub retry_after: RetryConfig,
    pub project_success: ProjectSuccessConfig,
    pub transport: TransportConfig,
    pub state_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    pub default_hours: f64,
    pub max_renewals: u32,
    pub warning_hours: f64,
    pub grace_period_minutes: u32,
    pub renewal_decay_factor: f64,
    pub min_lease_hours: f64,
    pub max_lease_hours: f64,
    pub stuck_threshold_renewals: u32,
    pub enable_adaptive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub skill_weight: f64,
    pub priority_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub floor_seconds: u64,
    pub cap_seconds: u64,
    pub buffer_fraction: f64,
    pub fallback_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSuccessConfig {
    pub completion_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    pub enable_auth: bool,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!("loaded .env file from {:?}", path),
            Err(e) => tracing::warn!("could not load .env file: {}", e),
        }

        let lease = LeaseConfig {
            default_hours: parse_env("MARCUS_LEASE_DEFAULT_HOURS", 2.0),
            max_renewals: parse_env("MARCUS_LEASE_MAX_RENEWALS", 10),
            warning_hours: parse_env("MARCUS_LEASE_WARNING_HOURS", 0.5),
            grace_period_minutes: parse_env("MARCUS_LEASE_GRACE_PERIOD_MINUTES", 30),
            renewal_decay_factor: parse_env("MARCUS_LEASE_RENEWAL_DECAY_FACTOR", 0.9),
            min_lease_hours: parse_env("MARCUS_LEASE_MIN_HOURS", 1.0),
            max_lease_hours: parse_env("MARCUS_LEASE_MAX_HOURS", 24.0),
            stuck_threshold_renewals: parse_env("MARCUS_LEASE_STUCK_THRESHOLD_RENEWALS", 5),
            enable_adaptive: parse_env("MARCUS_LEASE_ENABLE_ADAPTIVE", true),
        };

        let scoring = ScoringConfig {
            skill_weight: parse_env("MARCUS_SCORING_SKILL_WEIGHT", 0.6),
            priority_weight: parse_env("MARCUS_SCORING_PRIORITY_WEIGHT", 0.4),
        };

        let retry_after = RetryConfig {
            floor_seconds: parse_env("MARCUS_RETRY_FLOOR_SECONDS", 30),
            cap_seconds: parse_env("MARCUS_RETRY_CAP_SECONDS", 3600),
            buffer_fraction: parse_env("MARCUS_RETRY_BUFFER_FRACTION", 0.10),
            fallback_hours: parse_env("MARCUS_RETRY_FALLBACK_HOURS", 1.0),
        };

        let project_success = ProjectSuccessConfig {
            completion_threshold: parse_env("MARCUS_PROJECT_SUCCESS_COMPLETION_THRESHOLD", 0.90),
        };

        // SECURITY: auth is opt-in via MARCUS_API_KEY, but if it's set it must
        // be usable — a blank key would silently disable auth while looking
        // configured.
        let api_key = env::var("MARCUS_API_KEY").ok();
        if let Some(key) = &api_key {
            if key.trim().is_empty() {
                return Err(MarcusError::ConfigurationError(
                    "MARCUS_API_KEY is set but blank".to_string(),
                ));
            }
            if key.len() < 32 {
                return Err(MarcusError::ConfigurationError(
                    "MARCUS_API_KEY must be at least 32 characters".to_string(),
                ));
            }
        }
        let enable_auth = api_key.is_some();

        let transport = TransportConfig {
            host: env_or("MARCUS_HOST", "127.0.0.1"),
            port: parse_env("MARCUS_PORT", 8745),
            api_key,
            enable_auth,
        };

        let state_dir = env_or("MARCUS_STATE_DIR", "./marcus_state");

        let config = Config {
            lease,
            scoring,
            retry_after,
            project_success,
            transport,
            state_dir,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.lease.min_lease_hours > self.lease.max_lease_hours {
            return Err(MarcusError::ConfigurationError(
                "task_lease.min_lease_hours cannot exceed task_lease.max_lease_hours".to_string(),
            ));
        }
        let weight_sum = self.scoring.skill_weight + self.scoring.priority_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(MarcusError::ConfigurationError(format!(
                "scoring.skill_weight + scoring.priority_weight must sum to 1.0, got {weight_sum}"
            )));
        }
        if self.retry_after.floor_seconds > self.retry_after.cap_seconds {
            return Err(MarcusError::ConfigurationError(
                "retry_after.floor_seconds cannot exceed retry_after.cap_seconds".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.project_success.completion_threshold) {
            return Err(MarcusError::ConfigurationError(
                "project_success.completion_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }
}
