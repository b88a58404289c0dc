//! Collaborator contracts (§6.1): the typed traits concrete transports
//! implement. The core is generic over these traits and never depends on a specific
//! transport or serializer (§9 design note).
//!
//! Grounded on `crates/swarm-agents/src/validator.rs`'s thin client-struct shape, lifted to
//! an `#[async_trait]` so `forge-agent` can provide HTTP- or rig-backed implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::accumulator::FileChange;
use crate::feedback::PerformanceRecord;
use crate::sandbox::SandboxOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousFeedback {
    pub score: f64,
    pub issues: Vec<ValidationIssue>,
    pub summary: Option<String>,
    pub build_errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub task: String,
    pub language: Option<String>,
    pub context: String,
    pub previous_feedback: Option<PreviousFeedback>,
    pub accumulated_files: Vec<FileChange>,
    pub target_files: Option<Vec<String>>,
    pub workspace: String,
    pub thinker_guidance: Option<String>,
    pub execution_capabilities: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudUsage {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub api_calls: u32,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub file_changes: Vec<FileChange>,
    pub explanation: Option<String>,
    pub error: Option<String>,
    pub tokens_used: u64,
    pub model_used: String,
    pub execution: Option<SandboxOutcome>,
    pub cloud_usage: Option<CloudUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    pub suggestion: Option<String>,
    pub rule: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub files: Vec<FileChange>,
    pub context: String,
    pub language: Option<String>,
    /// Opaque tag, e.g. "standard" or "enterprise" — interpreted by the validator, never
    /// branched on by the core (§9 open-question decision).
    pub mode: String,
    pub original_task: String,
    pub workspace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub passed: bool,
    pub score: f64,
    pub issues: Vec<ValidationIssue>,
    pub suggestions: Vec<String>,
    pub summary: Option<String>,
    pub build_errors: Option<Vec<String>>,
    pub confidence: f64,
    pub models_used: Vec<String>,
    pub ensemble_results: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThinkHistoryEntry {
    pub iteration: u32,
    pub summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("transient error calling {endpoint}: {message}")]
    Transient { endpoint: String, message: String },
    #[error("permanent error calling {endpoint}: {message}")]
    Permanent { endpoint: String, message: String },
    #[error("rate limited calling {endpoint}")]
    RateLimited { endpoint: String },
    #[error("deadline exceeded calling {endpoint}")]
    DeadlineExceeded { endpoint: String },
}

/// `generate(request) -> GenerateResponse`, §6.1.
#[async_trait]
pub trait CodeGenClient: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, CollaboratorError>;
}

/// `validate(...) -> ValidateResponse`, §6.1.
#[async_trait]
pub trait ValidatorClient: Send + Sync {
    async fn validate(&self, request: ValidateRequest) -> Result<ValidateResponse, CollaboratorError>;
}

/// `think(task, context, history, fileSummary) -> guidance`, §6.1. Failure is non-fatal at
/// the call site (§4.5 step 1); the trait itself still surfaces a typed error so callers can
/// log it before discarding it.
#[async_trait]
pub trait ThinkerClient: Send + Sync {
    async fn think(
        &self,
        task: &str,
        context: &str,
        history: &[ThinkHistoryEntry],
        file_summary: &str,
    ) -> Result<String, CollaboratorError>;
}

/// `recordPerformance(record)`, `getStats(...)`, §6.1. Both best-effort.
#[async_trait]
pub trait MemoryClient: Send + Sync {
    async fn record_performance(&self, record: &PerformanceRecord) -> Result<(), CollaboratorError>;
    async fn get_stats(
        &self,
        task_type: Option<&str>,
        language: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_response_round_trips_through_json() {
        let resp = GenerateResponse {
            success: true,
            file_changes: vec![],
            explanation: None,
            error: None,
            tokens_used: 100,
            model_used: "local-coder".into(),
            execution: None,
            cloud_usage: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: GenerateResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.model_used, "local-coder");
        assert_eq!(back.tokens_used, 100);
    }
}
