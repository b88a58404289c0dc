//! Job data model (§3).
//!
//! Grounded on `state/types.rs`'s builder-method style and
//! `crates/swarm-agents/src/state_machine.rs`'s `TransitionRecord`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accumulator::FileAccumulator;
use crate::collaborators::{CloudUsage, ValidationIssue};
use crate::model::{ModelId, Purpose};
use crate::plan::TaskPlan;
use crate::state_machine::JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Standard,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Batch,
    StepByStep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub task: String,
    pub context: String,
    pub workspace: String,
    pub language: Option<String>,
    pub max_iterations: u32,
    pub min_score: f64,
    pub validation_mode: ValidationMode,
    pub execution_mode: ExecutionMode,
    pub auto_write_files: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub name: String,
    pub iteration: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub status: PhaseStatus,
    pub details: Option<serde_json::Value>,
}

/// Payload accompanying a resume of a `NeedsHelp` job (§6.2 `help` operation): free-text hint,
/// optional code snippet, optional file to focus the next attempt on, and an optional flag to
/// skip the stuck step outright rather than retry it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpResponse {
    pub hint: Option<String>,
    pub code_snippet: Option<String>,
    pub focus_file: Option<String>,
    #[serde(default)]
    pub skip_step: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptHistory {
    pub iteration: u32,
    pub model: ModelId,
    pub score: f64,
    pub issues: Vec<ValidationIssue>,
    pub build_errors: Option<Vec<String>>,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Job metadata and history; owns the File Accumulator. `state` and transitions are
/// delegated to `state_machine::StateMachine` wrapping this record's `job_state` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub request: JobRequest,
    pub job_state: JobState,
    pub progress: u8,
    pub current_phase: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub timeline: Vec<PhaseInfo>,
    pub plan: Option<TaskPlan>,
    #[serde(skip)]
    pub accumulated_files: FileAccumulator,
    pub tried_models: HashMap<Purpose, HashSet<ModelId>>,
    pub history: Vec<AttemptHistory>,
    pub cloud_usage: CloudUsage,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub unpersisted: bool,
    /// Per-step attempt counts in step-by-step mode, keyed by `PlanStep::order` (§4.5.1).
    #[serde(default)]
    pub step_attempts: HashMap<u32, u32>,
    /// Set by `resume()` when a `NeedsHelp` job is given a hint; consumed (and cleared) by the
    /// next `run_step_iteration` call.
    #[serde(default)]
    pub pending_help: Option<HelpResponse>,
}

impl Job {
    pub fn new(id: String, request: JobRequest) -> Self {
        let now = Utc::now();
        let max_iterations = request.max_iterations;
        Self {
            id,
            request,
            job_state: JobState::Queued,
            progress: 0,
            current_phase: "queued".into(),
            iteration: 0,
            max_iterations,
            timeline: Vec::new(),
            plan: None,
            accumulated_files: FileAccumulator::new(),
            tried_models: HashMap::new(),
            history: Vec::new(),
            cloud_usage: CloudUsage {
                provider: String::new(),
                model: String::new(),
                input_tokens: 0,
                output_tokens: 0,
                api_calls: 0,
                estimated_cost: 0.0,
            },
            started_at: now,
            last_updated_at: now,
            completed_at: None,
            unpersisted: false,
            step_attempts: HashMap::new(),
            pending_help: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.job_state.is_terminal()
    }

    pub fn mark_tried(&mut self, purpose: Purpose, model: ModelId) {
        self.tried_models.entry(purpose).or_default().insert(model);
    }

    pub fn tried_for(&self, purpose: Purpose) -> HashSet<ModelId> {
        self.tried_models.get(&purpose).cloned().unwrap_or_default()
    }

    /// §4.6: Plan = 10%, per-iteration = (80 / maxIterations)%, finalize = 10%. Progress is
    /// monotonically non-decreasing while Running (§3 invariant); callers only ever increase
    /// `progress` via this helper.
    pub fn advance_progress(&mut self, new_value: u8) {
        if new_value > self.progress {
            self.progress = new_value;
        }
    }

    pub fn push_phase(&mut self, phase: PhaseInfo) {
        self.timeline.push(phase);
        self.last_updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        JobRequest {
            task: "Create a Calculator class".into(),
            context: "csharp-calc".into(),
            workspace: "ws1".into(),
            language: Some("csharp".into()),
            max_iterations: 10,
            min_score: 8.0,
            validation_mode: ValidationMode::Standard,
            execution_mode: ExecutionMode::Batch,
            auto_write_files: true,
        }
    }

    #[test]
    fn new_job_starts_queued_with_zero_progress() {
        let job = Job::new("job-1".into(), request());
        assert_eq!(job.job_state, JobState::Queued);
        assert_eq!(job.progress, 0);
        assert_eq!(job.iteration, 0);
    }

    #[test]
    fn tried_models_are_tracked_per_purpose() {
        let mut job = Job::new("job-1".into(), request());
        job.mark_tried(Purpose::CodeGeneration, "local-coder".into());
        assert!(job.tried_for(Purpose::CodeGeneration).contains("local-coder"));
        assert!(job.tried_for(Purpose::Validation).is_empty());
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = Job::new("job-1".into(), request());
        job.advance_progress(50);
        job.advance_progress(10);
        assert_eq!(job.progress, 50);
        job.advance_progress(90);
        assert_eq!(job.progress, 90);
    }
}
