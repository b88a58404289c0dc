//! Error taxonomy for the orchestrator core.
//!
//! Each module defines its own narrow error enum; this module composes them into the
//! boundary taxonomy of §7 and the agent-facing `TaskError` record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminant mirroring the §7 taxonomy, carried on `OrchestratorError` so callers never
/// need to string-match a `Display` impl to recover the error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    TransientBackend,
    PermanentBackend,
    Iteration,
    AllModelsExhausted,
    Cancelled,
    TimedOut,
    Storage,
    Config,
}

impl ErrorKind {
    /// Whether a `TaskError` of this kind is safe to retry per §7.
    pub fn default_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientBackend | ErrorKind::AllModelsExhausted)
    }
}

/// Top-level error type returned to callers of the core's public API.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("transient backend error calling {endpoint}: {message}")]
    TransientBackend { endpoint: String, message: String },

    #[error("permanent backend error calling {endpoint}: {message}")]
    PermanentBackend { endpoint: String, message: String },

    #[error("iteration {iteration} produced no usable artifact: {message}")]
    Iteration { iteration: u32, message: String },

    #[error("all models exhausted for purpose {purpose}")]
    AllModelsExhausted { purpose: String },

    #[error("job cancelled")]
    Cancelled,

    #[error("job timed out after {elapsed_secs}s")]
    TimedOut { elapsed_secs: u64 },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::Validation { .. } => ErrorKind::Validation,
            OrchestratorError::TransientBackend { .. } => ErrorKind::TransientBackend,
            OrchestratorError::PermanentBackend { .. } => ErrorKind::PermanentBackend,
            OrchestratorError::Iteration { .. } => ErrorKind::Iteration,
            OrchestratorError::AllModelsExhausted { .. } => ErrorKind::AllModelsExhausted,
            OrchestratorError::Cancelled => ErrorKind::Cancelled,
            OrchestratorError::TimedOut { .. } => ErrorKind::TimedOut,
            OrchestratorError::Storage { .. } => ErrorKind::Storage,
            OrchestratorError::Config { .. } => ErrorKind::Config,
        }
    }

    /// §7: canRetry is true for TransientBackendError remnants and AllModelsExhausted with a
    /// cloud tier still unlocked; false for ValidationError and ConfigError. The cloud-tier
    /// check is the caller's responsibility (it knows the registry state); this default
    /// covers the unconditional cases.
    pub fn default_can_retry(&self) -> bool {
        self.kind().default_retryable()
    }
}

/// Phase label attached to a `TaskError`, matching the Iteration Engine's pipeline steps.
pub type Phase = String;

/// Agent-facing failure record, §7's `TaskError`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub phase: Option<Phase>,
    pub partial_result: Option<serde_json::Value>,
    pub can_retry: bool,
    pub details: HashMap<String, serde_json::Value>,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            phase: None,
            partial_result: None,
            can_retry: kind.default_retryable(),
            details: HashMap::new(),
        }
    }

    pub fn from_orchestrator_error(err: &OrchestratorError) -> Self {
        Self::new(err.kind(), err.to_string())
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_partial_result(mut self, value: serde_json::Value) -> Self {
        self.partial_result = Some(value);
        self
    }

    pub fn with_can_retry(mut self, can_retry: bool) -> Self {
        self.can_retry = can_retry;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable_by_default() {
        let err = OrchestratorError::Validation { message: "task too short".into() };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.default_can_retry());
    }

    #[test]
    fn transient_backend_errors_are_retryable_by_default() {
        let err = OrchestratorError::TransientBackend {
            endpoint: "validator".into(),
            message: "connection reset".into(),
        };
        assert!(err.default_can_retry());
    }

    #[test]
    fn task_error_builder_round_trips_through_json() {
        let err = TaskError::new(ErrorKind::AllModelsExhausted, "no candidates left")
            .with_phase("validate")
            .with_can_retry(true)
            .with_detail("iteration", serde_json::json!(4));
        let json = serde_json::to_string(&err).unwrap();
        let back: TaskError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.phase.as_deref(), Some("validate"));
        assert_eq!(back.kind, ErrorKind::AllModelsExhausted);
        assert!(back.can_retry);
    }

    #[test]
    fn config_errors_are_not_retryable() {
        let err = OrchestratorError::Config { message: "bad catalog".into() };
        assert!(!err.default_can_retry());
    }
}
