//! Job state machine (§4.6): explicit states, a legal-transition table, and an
//! append-only transition audit trail.
//!
//! Grounded directly on `crates/swarm-agents/src/state_machine.rs`'s `OrchestratorState` /
//! `StateMachine` / `TransitionRecord` shape, narrowed to the job lifecycle's own states and
//! events.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The set of job states. Every job starts at `Queued` and terminates at `Complete`,
/// `Failed`, `Cancelled`, or `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    NeedsHelp,
    Complete,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled | Self::TimedOut)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::Running => write!(f, "Running"),
            Self::NeedsHelp => write!(f, "NeedsHelp"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::TimedOut => write!(f, "TimedOut"),
        }
    }
}

/// The event that drove a transition, carried on `TransitionRecord` for audit purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    Admit,
    Dispatch,
    DecideComplete,
    DecideFailed,
    Cancel,
    Deadline,
    StepExhausted,
    Resume,
}

/// Legal transitions (§4.6 table). Applying a transition outside this table is an
/// `IllegalTransition` programming error, logged rather than silently absorbed.
fn is_legal_transition(from: JobState, to: JobState, event: JobEvent) -> bool {
    use JobEvent::*;
    use JobState::*;

    matches!(
        (from, event, to),
        (Queued, Dispatch, Running)
            | (Running, DecideComplete, Complete)
            | (Running, DecideFailed, Failed)
            | (Running, Cancel, Cancelled)
            | (Running, Deadline, TimedOut)
            | (Running, StepExhausted, NeedsHelp)
            | (NeedsHelp, Resume, Running)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: JobState,
    pub to: JobState,
    pub event: JobEvent,
    pub iteration: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: JobState,
    pub to: JobState,
    pub event: JobEvent,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal job transition: {} -[{:?}]-> {}", self.from, self.event, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Per-job state machine: current state plus a complete transition log for replay/audit.
#[derive(Debug)]
pub struct StateMachine {
    current: JobState,
    iteration: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self { current: JobState::Queued, iteration: 0, created_at: Instant::now(), transitions: Vec::new() }
    }

    pub fn current(&self) -> JobState {
        self.current
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Attempt to advance. On success the transition is appended to the audit trail; on
    /// failure nothing is mutated and the caller receives a typed `IllegalTransition`.
    pub fn advance(&mut self, to: JobState, event: JobEvent) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to, event) {
            return Err(IllegalTransition { from: self.current, to, event });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            event,
            iteration: self.iteration,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            event = ?event,
            iteration = self.iteration,
            "job state transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Checkpoint schema version carried on every persisted job record (§4.7).
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCheckpoint {
    pub schema_version: u32,
    pub state: JobState,
    pub iteration: u32,
    pub transitions: Vec<TransitionRecord>,
}

/// Distinguishes a normal restore from a schema mismatch so the restart scan (§4.7) can apply
/// its own discard-vs-reparse policy instead of silently misinterpreting bytes.
#[derive(Debug)]
pub enum ResumeResult {
    Restored(StateMachine),
    IncompatibleSchema { found: u32, expected: u32 },
    StaleCheckpoint { reason: String },
}

pub fn resume_from_checkpoint(checkpoint: StateCheckpoint) -> ResumeResult {
    if checkpoint.schema_version != CHECKPOINT_SCHEMA_VERSION {
        return ResumeResult::IncompatibleSchema {
            found: checkpoint.schema_version,
            expected: CHECKPOINT_SCHEMA_VERSION,
        };
    }
    let mut machine = StateMachine::new();
    machine.current = checkpoint.state;
    machine.iteration = checkpoint.iteration;
    machine.transitions = checkpoint.transitions;
    ResumeResult::Restored(machine)
}
