//! forge-core: the concurrent, persistent, multi-model retry engine that drives a bounded
//! job through THINK → SELECT → GENERATE → ACCUMULATE → EXECUTE → VALIDATE → DECIDE,
//! escalating from cheap to expensive models as attempts fail, and producing either an
//! accepted file set or a structured failure report.
//!
//! This crate is transport-agnostic: it depends only on the collaborator traits in
//! `collaborators` and `sandbox`; concrete HTTP/rig-backed clients live in `forge-agent`.

pub mod accumulator;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod escalation;
pub mod facade;
pub mod feedback;
pub mod friction;
pub mod iteration;
pub mod job;
pub mod manager;
pub mod model;
pub mod persistence;
pub mod plan;
pub mod registry;
pub mod resilience;
pub mod sandbox;
pub mod state_machine;

pub use accumulator::{ChangeType, FileAccumulator, FileChange, LanguagePolicy};
pub use collaborators::{
    CodeGenClient, CollaboratorError, GenerateRequest, GenerateResponse, MemoryClient, ThinkerClient,
    ValidateRequest, ValidateResponse, ValidationIssue, ValidatorClient,
};
pub use config::{AppConfig, ConfigError, ModelsConfig};
pub use error::{ErrorKind, OrchestratorError, OrchestratorResult, TaskError};
pub use escalation::{EscalationConfig, EscalationDecision};
pub use facade::{validate_admission, AdmissionError};
pub use feedback::{Outcome, PerformanceRecord, PerformanceStore};
pub use friction::FrictionSignal;
pub use iteration::{run_iteration, run_step_iteration, IterationDeps, IterationError, IterationOutcome, StepIterationOutcome};
pub use job::{AttemptHistory, ExecutionMode, HelpResponse, Job, JobRequest, PhaseInfo, ValidationMode};
pub use manager::{JobManager, ManagerError};
pub use model::{Complexity, ModelDescriptor, ModelId, Purpose, SelectionHint, Tier};
pub use persistence::{FileSystemPersistence, PersistenceLayer, StorageError};
pub use plan::{PlanError, PlanStep, StepStatus, TaskPlan};
pub use registry::{ModelRegistry, RegistryError, Selector};
pub use resilience::{CircuitBreaker, CircuitState, RetryPolicy};
pub use sandbox::{BuildResult, ExecuteResult, LanguageManifest, SandboxAdapter, SandboxError, SandboxOutcome};
pub use state_machine::{JobEvent, JobState, StateMachine};
