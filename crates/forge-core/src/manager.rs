//! Job Manager (§4.6, §5): admission, a bounded worker pool, FIFO dispatch, cooperative
//! cancellation, and resume-from-`NeedsHelp`.
//!
//! Grounded on the fire-and-forget `tokio::spawn` idiom in `orchestrator.rs`'s webhook
//! notification path, generalized into a bounded pool via `tokio::sync::Semaphore`, with
//! per-job cancellation via `tokio_util::sync::CancellationToken`.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::escalation::EscalationDecision;
use crate::facade::{self, AdmissionError};
use crate::friction::IterationSignal;
use crate::iteration::{run_iteration, run_step_iteration, IterationDeps, IterationError, StepIterationOutcome};
use crate::job::{ExecutionMode, HelpResponse, Job, JobRequest};
use crate::model::Tier;
use crate::persistence::PersistenceLayer;
use crate::state_machine::{JobEvent, JobState};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("admission rejected: {0}")]
    Admission(#[from] AdmissionError),
    #[error("no job with id {0}")]
    NotFound(String),
    #[error("job {0} is in a terminal state and cannot be cancelled or resumed")]
    TerminalConflict(String),
    #[error("queue is at capacity ({0})")]
    Overloaded(u32),
}

struct JobSlot {
    job: Mutex<Job>,
    cancellation: CancellationToken,
}

/// Bounded pool of concurrently-running jobs; excess admitted jobs wait in a FIFO queue until
/// capacity frees (§4.6). Cancellation sets a flag observed at phase boundaries rather than
/// forcibly aborting in-flight work.
pub struct JobManager {
    slots: RwLock<std::collections::HashMap<String, Arc<JobSlot>>>,
    queue: Mutex<VecDeque<String>>,
    dispatch_permits: Arc<Semaphore>,
    queue_capacity: u32,
}

impl JobManager {
    pub fn new(max_concurrent_jobs: u32, queue_capacity: u32) -> Self {
        Self {
            slots: RwLock::new(std::collections::HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            dispatch_permits: Arc::new(Semaphore::new(max_concurrent_jobs as usize)),
            queue_capacity,
        }
    }

    /// Validates the request (§4.8) and admits it as `Queued`. Rejects with `Overloaded` when
    /// the queue is already at capacity; admission failures leave manager state unchanged.
    pub async fn admit(&self, request: JobRequest, job_id: String) -> Result<String, ManagerError> {
        facade::validate_admission(&request)?;

        let mut queue = self.queue.lock().await;
        if queue.len() as u32 >= self.queue_capacity {
            return Err(ManagerError::Overloaded(self.queue_capacity));
        }

        let job = Job::new(job_id.clone(), request);
        let slot = Arc::new(JobSlot { job: Mutex::new(job), cancellation: CancellationToken::new() });
        self.slots.write().await.insert(job_id.clone(), slot);
        queue.push_back(job_id.clone());
        info!(job_id = %job_id, "job admitted");
        Ok(job_id)
    }

    /// Dequeues the next FIFO job and acquires a dispatch permit, blocking until capacity
    /// frees. Returns `None` when the queue is empty.
    pub async fn try_dispatch_next(self: &Arc<Self>) -> Option<(String, tokio::sync::OwnedSemaphorePermit)> {
        let job_id = self.queue.lock().await.pop_front()?;
        let permit = self.dispatch_permits.clone().acquire_owned().await.ok()?;
        if let Some(slot) = self.slots.read().await.get(&job_id).cloned() {
            let mut job = slot.job.lock().await;
            job.job_state = JobState::Running;
        }
        Some((job_id, permit))
    }

    /// Acquires a dispatch permit outside the FIFO queue, for redispatching a job that is
    /// resuming from `NeedsHelp` rather than being admitted fresh (§6.2 `help` operation).
    pub async fn acquire_dispatch_permit(self: &Arc<Self>) -> Option<tokio::sync::OwnedSemaphorePermit> {
        self.dispatch_permits.clone().acquire_owned().await.ok()
    }

    pub async fn cancel(&self, job_id: &str) -> Result<(), ManagerError> {
        let slots = self.slots.read().await;
        let slot = slots.get(job_id).ok_or_else(|| ManagerError::NotFound(job_id.to_string()))?;
        let mut job = slot.job.lock().await;
        if job.is_terminal() {
            return Err(ManagerError::TerminalConflict(job_id.to_string()));
        }
        slot.cancellation.cancel();
        job.job_state = JobState::Cancelled;
        job.completed_at = Some(chrono::Utc::now());
        warn!(job_id, "job cancelled");
        Ok(())
    }

    /// Resumes a `NeedsHelp` job with a help payload (§6.2 `POST /orchestrate/{jobId}/help`):
    /// merges the hint onto the job so the next `run_step_iteration` call folds it into the
    /// stuck step's prompt, and transitions the job back to `Running`. Conflicts (job not
    /// `NeedsHelp`) map to `TerminalConflict` the same way a resume of a terminal job would.
    pub async fn resume(&self, job_id: &str, help: HelpResponse) -> Result<(), ManagerError> {
        let slots = self.slots.read().await;
        let slot = slots.get(job_id).ok_or_else(|| ManagerError::NotFound(job_id.to_string()))?;
        let mut job = slot.job.lock().await;
        if job.job_state != JobState::NeedsHelp {
            return Err(ManagerError::TerminalConflict(job_id.to_string()));
        }
        job.pending_help = Some(help);
        job.job_state = JobState::Running;
        Ok(())
    }

    pub async fn is_cancelled(&self, job_id: &str) -> bool {
        match self.slots.read().await.get(job_id) {
            Some(slot) => slot.cancellation.is_cancelled(),
            None => false,
        }
    }

    pub async fn status(&self, job_id: &str) -> Result<JobState, ManagerError> {
        let slots = self.slots.read().await;
        let slot = slots.get(job_id).ok_or_else(|| ManagerError::NotFound(job_id.to_string()))?;
        Ok(slot.job.lock().await.job_state)
    }

    pub async fn list_ids(&self) -> Vec<String> {
        self.slots.read().await.keys().cloned().collect()
    }

    /// Returns a snapshot of the full job record, for richer status reporting than `status()`
    /// alone provides (§6.2's `GET /orchestrate/{jobId}`).
    pub async fn snapshot(&self, job_id: &str) -> Result<Job, ManagerError> {
        let slots = self.slots.read().await;
        let slot = slots.get(job_id).ok_or_else(|| ManagerError::NotFound(job_id.to_string()))?;
        Ok(slot.job.lock().await.clone())
    }

    /// Drives `job_id` through the Iteration Engine (§4.5) from its current state until it
    /// reaches a terminal state or `NeedsHelp`, checkpointing after every iteration (§4.7,
    /// write-through). Starts with only the Local tier unlocked and widens as DECIDE escalates
    /// (§4.1). Observes cancellation at each iteration boundary, never mid-call (§5).
    pub async fn run_job(
        &self,
        job_id: &str,
        deps: &IterationDeps<'_>,
        persistence: &dyn PersistenceLayer,
    ) -> Result<JobState, ManagerError> {
        let slot = {
            let slots = self.slots.read().await;
            slots.get(job_id).cloned().ok_or_else(|| ManagerError::NotFound(job_id.to_string()))?
        };

        let mut unlocked_tiers = vec![Tier::Local];
        let mut history_signals: Vec<IterationSignal> = Vec::new();

        loop {
            if slot.cancellation.is_cancelled() {
                let mut job = slot.job.lock().await;
                job.job_state = JobState::Cancelled;
                job.completed_at = Some(chrono::Utc::now());
                if let Err(e) = persistence.save_job(&job).await {
                    warn!(job_id, error = %e, "failed to checkpoint cancelled job");
                }
                return Ok(JobState::Cancelled);
            }

            let mut job = slot.job.lock().await;
            let execution_mode = job.request.execution_mode;

            let final_state = match execution_mode {
                ExecutionMode::Batch => {
                    let outcome = run_iteration(&mut job, deps, &unlocked_tiers, &mut history_signals).await;
                    match outcome {
                        Ok(iteration_outcome) => match iteration_outcome.decision {
                            EscalationDecision::Complete { .. } => {
                                job.job_state = JobState::Complete;
                                job.completed_at = Some(chrono::Utc::now());
                                Some(JobState::Complete)
                            }
                            EscalationDecision::Continue { unlocked_tier } => {
                                if !unlocked_tiers.contains(&unlocked_tier) {
                                    unlocked_tiers.push(unlocked_tier);
                                }
                                None
                            }
                            EscalationDecision::Failed => {
                                job.job_state = JobState::Failed;
                                job.completed_at = Some(chrono::Utc::now());
                                Some(JobState::Failed)
                            }
                        },
                        Err(IterationError::AllModelsExhausted) => {
                            warn!(job_id, "no code-gen candidates remain across any unlocked tier; job failed");
                            job.job_state = JobState::Failed;
                            job.completed_at = Some(chrono::Utc::now());
                            Some(JobState::Failed)
                        }
                    }
                }
                ExecutionMode::StepByStep => {
                    let outcome = run_step_iteration(&mut job, deps, &unlocked_tiers, &mut history_signals).await;
                    match outcome {
                        Ok(StepIterationOutcome::AllStepsCompleted { .. }) => {
                            job.job_state = JobState::Complete;
                            job.completed_at = Some(chrono::Utc::now());
                            Some(JobState::Complete)
                        }
                        Ok(StepIterationOutcome::InProgress) => None,
                        Ok(StepIterationOutcome::NeedsHelp { step_order }) => {
                            warn!(job_id, step_order, "step exhausted its retry budget; job needs help");
                            job.job_state = JobState::NeedsHelp;
                            Some(JobState::NeedsHelp)
                        }
                        Err(IterationError::AllModelsExhausted) => {
                            warn!(job_id, "no code-gen candidates remain across any unlocked tier; job failed");
                            job.job_state = JobState::Failed;
                            job.completed_at = Some(chrono::Utc::now());
                            Some(JobState::Failed)
                        }
                    }
                }
            };

            if let Err(e) = persistence.save_job(&job).await {
                warn!(job_id, error = %e, "failed to checkpoint job; continuing unpersisted");
                job.unpersisted = true;
            }

            if let Some(state) = final_state {
                return Ok(state);
            }
        }
    }
}

/// Applies a job-state transition through the state machine table (§4.6), returning the event
/// used so callers can decide whether to persist/log distinctly per event.
pub fn event_for_decision(complete: bool) -> JobEvent {
    if complete { JobEvent::DecideComplete } else { JobEvent::DecideFailed }
}
