//! Configuration surface (§6.3, §12): compiled defaults, overridden by environment variables,
//! overridden by an optional TOML file. Every env var follows `<Component>_<Key>` in
//! SCREAMING_SNAKE_CASE and is parsed defensively — present-but-unparseable or out-of-range is
//! a fatal `ConfigError`; only an absent variable falls back to the compiled default.
//!
//! Grounded on the resilience envelope's typed-error idiom (`resilience.rs`) applied to startup
//! configuration, and on `model.rs`'s `ModelDescriptor` for the TOML-loaded catalog shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::ModelDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {key} is set to {value:?} but could not be parsed: {reason}")]
    Unparseable { key: String, value: String, reason: String },
    #[error("environment variable {key} is set to {value} but is out of range ({low}..={high})")]
    OutOfRange { key: String, value: String, low: String, high: String },
    #[error("model catalog failed to parse: {0}")]
    CatalogParse(String),
    #[error("catalog file {0} could not be read: {1}")]
    CatalogIo(String, std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_concurrent_jobs: u32,
    pub queue_capacity: u32,
    pub retention_days: u32,
    pub job_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            queue_capacity: 32,
            retention_days: 7,
            job_timeout: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    pub retry_attempts: u32,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_break_duration: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self { retry_attempts: 3, circuit_breaker_threshold: 5, circuit_breaker_break_duration: Duration::from_secs(30) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEnvConfig {
    pub tier1_threshold: u32,
    pub tier2_threshold: u32,
}

impl Default for EscalationEnvConfig {
    fn default() -> Self {
        Self { tier1_threshold: 3, tier2_threshold: 6 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationEnvConfig {
    pub min_acceptable_score: u32,
    pub floor_score: f64,
    pub floor_after_attempts: u32,
    /// §4.5.1's per-step retry budget before a step-by-step job transitions to NeedsHelp.
    pub step_retry_budget: u32,
}

impl Default for IterationEnvConfig {
    fn default() -> Self {
        Self { min_acceptable_score: 8, floor_score: 6.5, floor_after_attempts: 3, step_retry_budget: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelCatalogFile {
    pub models: Vec<ModelDescriptor>,
}

/// §4.1's "resource weight fits the declared budget" condition on `selectNext`; the one
/// catalog-wide knob, as distinct from `ModelCatalogFile`'s per-model declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub weight_budget: u32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self { weight_budget: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub orchestrator: OrchestratorConfig,
    pub resilience: ResilienceConfig,
    pub escalation: EscalationEnvConfig,
    pub iteration: IterationEnvConfig,
    pub models: ModelsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            resilience: ResilienceConfig::default(),
            escalation: EscalationEnvConfig::default(),
            iteration: IterationEnvConfig::default(),
            models: ModelsConfig::default(),
        }
    }
}

/// Reads an env var as `u32`, applying `key`'s compiled default when the variable is absent.
/// A present-but-unparseable or out-of-range value is a fatal `ConfigError` — never a silent
/// fallback.
fn env_u32(key: &str, default: u32, range: std::ops::RangeInclusive<u32>) -> Result<u32, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => {
            let parsed: u32 = raw
                .parse()
                .map_err(|e: std::num::ParseIntError| ConfigError::Unparseable { key: key.into(), value: raw.clone(), reason: e.to_string() })?;
            if !range.contains(&parsed) {
                return Err(ConfigError::OutOfRange {
                    key: key.into(),
                    value: raw,
                    low: range.start().to_string(),
                    high: range.end().to_string(),
                });
            }
            Ok(parsed)
        }
    }
}

fn env_f64(key: &str, default: f64, range: std::ops::RangeInclusive<f64>) -> Result<f64, ConfigError> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => {
            let parsed: f64 = raw
                .parse()
                .map_err(|e: std::num::ParseFloatError| ConfigError::Unparseable { key: key.into(), value: raw.clone(), reason: e.to_string() })?;
            if parsed < *range.start() || parsed > *range.end() {
                return Err(ConfigError::OutOfRange {
                    key: key.into(),
                    value: raw,
                    low: range.start().to_string(),
                    high: range.end().to_string(),
                });
            }
            Ok(parsed)
        }
    }
}

fn env_duration_secs(key: &str, default: Duration, range: std::ops::RangeInclusive<u64>) -> Result<Duration, ConfigError> {
    let secs = env_u32(key, default.as_secs() as u32, (*range.start() as u32)..=(*range.end() as u32))?;
    Ok(Duration::from_secs(secs as u64))
}

/// Layer 2: compiled defaults overridden by environment variables (§12 naming convention).
/// TOML-file overrides (layer 3, `--config`) are applied by the caller on top of this result
/// via `serde` merge before CLI flags (layer 4) are applied.
pub fn load_from_env() -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    Ok(AppConfig {
        orchestrator: OrchestratorConfig {
            max_concurrent_jobs: env_u32("ORCHESTRATOR_MAX_CONCURRENT_JOBS", defaults.orchestrator.max_concurrent_jobs, 1..=1024)?,
            queue_capacity: env_u32("ORCHESTRATOR_QUEUE_CAPACITY", defaults.orchestrator.queue_capacity, 1..=100_000)?,
            retention_days: env_u32("ORCHESTRATOR_RETENTION_DAYS", defaults.orchestrator.retention_days, 0..=3650)?,
            job_timeout: env_duration_secs("ORCHESTRATOR_JOB_TIMEOUT", defaults.orchestrator.job_timeout, 1..=86_400)?,
        },
        resilience: ResilienceConfig {
            retry_attempts: env_u32("RESILIENCE_RETRY_ATTEMPTS", defaults.resilience.retry_attempts, 0..=20)?,
            circuit_breaker_threshold: env_u32(
                "RESILIENCE_CIRCUIT_BREAKER_THRESHOLD",
                defaults.resilience.circuit_breaker_threshold,
                1..=1000,
            )?,
            circuit_breaker_break_duration: env_duration_secs(
                "RESILIENCE_CIRCUIT_BREAKER_BREAK_DURATION",
                defaults.resilience.circuit_breaker_break_duration,
                1..=3600,
            )?,
        },
        escalation: EscalationEnvConfig {
            tier1_threshold: env_u32("ESCALATION_TIER1_THRESHOLD", defaults.escalation.tier1_threshold, 1..=1000)?,
            tier2_threshold: env_u32("ESCALATION_TIER2_THRESHOLD", defaults.escalation.tier2_threshold, 1..=1000)?,
        },
        iteration: IterationEnvConfig {
            min_acceptable_score: env_u32("ITERATION_MIN_ACCEPTABLE_SCORE", defaults.iteration.min_acceptable_score, 0..=10)?,
            floor_score: env_f64("ITERATION_FLOOR_SCORE", defaults.iteration.floor_score, 0.0..=10.0)?,
            floor_after_attempts: env_u32(
                "ITERATION_FLOOR_AFTER_ATTEMPTS",
                defaults.iteration.floor_after_attempts,
                0..=1000,
            )?,
            step_retry_budget: env_u32("ITERATION_STEP_RETRY_BUDGET", defaults.iteration.step_retry_budget, 1..=1000)?,
        },
        models: ModelsConfig {
            weight_budget: env_u32("MODELS_WEIGHT_BUDGET", defaults.models.weight_budget, 1..=1000)?,
        },
    })
}

/// Loads the model catalog from a TOML document (§6.3, §12): the one configuration surface
/// too structured for a flat env var.
pub fn load_catalog(path: &std::path::Path) -> Result<ModelCatalogFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogIo(path.display().to_string(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::CatalogParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn absent_env_vars_fall_back_to_compiled_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("ORCHESTRATOR_MAX_CONCURRENT_JOBS");
        let cfg = load_from_env().unwrap();
        assert_eq!(cfg.orchestrator.max_concurrent_jobs, 4);
    }

    #[test]
    fn present_valid_env_var_overrides_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ORCHESTRATOR_MAX_CONCURRENT_JOBS", "16");
        let cfg = load_from_env().unwrap();
        assert_eq!(cfg.orchestrator.max_concurrent_jobs, 16);
        std::env::remove_var("ORCHESTRATOR_MAX_CONCURRENT_JOBS");
    }

    #[test]
    fn unparseable_env_var_is_a_fatal_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ORCHESTRATOR_MAX_CONCURRENT_JOBS", "not-a-number");
        let err = load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Unparseable { .. }));
        std::env::remove_var("ORCHESTRATOR_MAX_CONCURRENT_JOBS");
    }

    #[test]
    fn out_of_range_env_var_is_a_fatal_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ITERATION_MIN_ACCEPTABLE_SCORE", "42");
        let err = load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
        std::env::remove_var("ITERATION_MIN_ACCEPTABLE_SCORE");
    }

    #[test]
    fn step_retry_budget_overrides_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ITERATION_STEP_RETRY_BUDGET", "3");
        let cfg = load_from_env().unwrap();
        assert_eq!(cfg.iteration.step_retry_budget, 3);
        std::env::remove_var("ITERATION_STEP_RETRY_BUDGET");
    }

    #[test]
    fn catalog_loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(
            &path,
            r#"
            [[models]]
            id = "local-coder"
            purpose = "code_generation"
            tier = "local"
            approximate_weight = 1
            priority = 0
            "#,
        )
        .unwrap();
        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.models.len(), 1);
        assert_eq!(catalog.models[0].id, "local-coder");
    }
}
