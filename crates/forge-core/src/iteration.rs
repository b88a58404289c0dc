//! Iteration Engine (§4.5): THINK → SELECT → GENERATE → ACCUMULATE → EXECUTE →
//! VALIDATE → DECIDE, the heart of the per-job retry loop.
//!
//! Grounded on the non-fatal KB-query pattern in `orchestrator.rs`'s
//! `query_kb_with_failsafe` (applied here to the THINK step) and its
//! `format_task_prompt` structured-prompt idiom (adapted into `build_thinker_prompt`).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::accumulator::{FileAccumulator, LanguagePolicy};
use crate::collaborators::{
    CodeGenClient, GenerateRequest, IssueSeverity, PreviousFeedback, ThinkHistoryEntry, ThinkerClient,
    ValidateRequest, ValidationIssue, ValidatorClient,
};
use crate::escalation::{self, EscalationConfig, EscalationDecision};
use crate::friction::{self, IterationSignal};
use crate::feedback::{Outcome, PerformanceRecord, PerformanceStore};
use crate::job::{AttemptHistory, HelpResponse, Job, PhaseInfo, PhaseStatus};
use crate::model::{Complexity, ModelId, Purpose, SelectionHint, Tier};
use crate::plan::{PlanStep, StepStatus, TaskPlan};
use crate::registry::{ModelRegistry, Selector};
use crate::sandbox::{self, LanguageManifest, SandboxAdapter};

#[derive(Debug, thiserror::Error)]
pub enum IterationError {
    #[error("no code-gen model available: all candidates exhausted")]
    AllModelsExhausted,
}

/// Outcome of a single iteration.
pub struct IterationOutcome {
    pub decision: EscalationDecision,
    pub score: f64,
    pub model_used: ModelId,
    pub duration_ms: u64,
    pub friction: Vec<friction::FrictionSignal>,
}

/// Collaborators an iteration needs; thin enough to construct per job from whatever concrete
/// transports `forge-agent` wires up.
pub struct IterationDeps<'a> {
    pub registry: &'a ModelRegistry,
    pub performance_store: &'a PerformanceStore,
    pub thinker: Option<Arc<dyn ThinkerClient>>,
    pub code_gen: Arc<dyn CodeGenClient>,
    pub validator: Arc<dyn ValidatorClient>,
    pub sandbox: Option<Arc<dyn SandboxAdapter>>,
    pub language_manifest: Option<LanguageManifest>,
    pub language_policy: LanguagePolicy,
    pub escalation_config: EscalationConfig,
    /// §4.1's "resource weight fits the declared budget" condition on `selectNext`.
    pub weight_budget: u32,
    /// Step-by-step mode's per-step retry budget before a job transitions to `NeedsHelp`
    /// (§4.5.1, default 10).
    pub step_retry_budget: u32,
}

/// Runs one full pipeline iteration against `job`, mutating its accumulator, tried-model set,
/// and history. Returns the DECIDE outcome; the caller (Job Manager) applies the resulting
/// state transition.
pub async fn run_iteration(
    job: &mut Job,
    deps: &IterationDeps<'_>,
    unlocked_tiers: &[Tier],
    history_signals: &mut Vec<IterationSignal>,
) -> Result<IterationOutcome, IterationError> {
    let started = Instant::now();
    job.iteration += 1;

    // 1. THINK — best-effort; failure never blocks the iteration.
    let guidance = if job.iteration <= 7 {
        think_with_failsafe(deps, job).await
    } else {
        None
    };

    // 2. SELECT
    let hint = SelectionHint {
        language: job.request.language.clone(),
        complexity: None,
        keywords: vec![],
    };
    let excluded = job.tried_for(Purpose::CodeGeneration);
    let selector = Selector::new(deps.registry, deps.performance_store);
    let descriptor = selector
        .select_next(Purpose::CodeGeneration, &excluded, unlocked_tiers, &hint, deps.weight_budget)
        .ok_or(IterationError::AllModelsExhausted)?;

    // 3. GENERATE
    let previous_feedback = job.history.last().map(|h| PreviousFeedback {
        score: h.score,
        issues: h.issues.clone(),
        summary: None,
        build_errors: h.build_errors.clone(),
    });
    let request = GenerateRequest {
        task: job.request.task.clone(),
        language: job.request.language.clone(),
        context: job.request.context.clone(),
        previous_feedback,
        accumulated_files: job.accumulated_files.execution_view().into_iter().cloned().collect(),
        target_files: None,
        workspace: job.request.workspace.clone(),
        thinker_guidance: guidance,
        execution_capabilities: deps.sandbox.is_some(),
    };

    job.mark_tried(Purpose::CodeGeneration, descriptor.id.clone());
    let outcome = generate_accumulate_execute_validate(job, deps, request).await;
    let score = outcome.score;
    let issues = outcome.issues;
    let build_errors = outcome.build_errors;

    // 7. DECIDE
    let failed_attempts = job.history.len() as u32;
    let decision =
        escalation::decide(&deps.escalation_config, score, job.iteration, job.max_iterations, failed_attempts);

    let duration_ms = started.elapsed().as_millis() as u64;
    job.history.push(AttemptHistory {
        iteration: job.iteration,
        model: descriptor.id.clone(),
        score,
        issues: issues.clone(),
        build_errors,
        duration_ms,
        recorded_at: chrono::Utc::now(),
    });

    history_signals.push(IterationSignal {
        categories: issues.iter().filter_map(|i| i.rule.clone()).collect(),
        error_count: issues.len(),
    });
    let friction_signals = friction::detect(history_signals);

    job.push_phase(PhaseInfo {
        name: "iterate".into(),
        iteration: Some(job.iteration),
        started_at: chrono::Utc::now(),
        completed_at: Some(chrono::Utc::now()),
        duration_ms: Some(duration_ms),
        status: PhaseStatus::Completed,
        details: Some(serde_json::json!({ "friction": friction_signals, "score": score })),
    });

    info!(job_id = %job.id, iteration = job.iteration, score, model = %descriptor.id, "iteration decided");

    // Learning Feedback Channel (§9 item 9): exactly one record per completed iteration,
    // independent of the iteration's own DECIDE outcome.
    deps.performance_store.record(PerformanceRecord {
        model: descriptor.id.clone(),
        task_type: "code_generation".into(),
        language: job.request.language.clone().unwrap_or_else(|| "unknown".into()),
        complexity: Complexity::Moderate,
        outcome: match decision {
            EscalationDecision::Complete { .. } => Outcome::Success,
            EscalationDecision::Continue { .. } => Outcome::Partial,
            EscalationDecision::Failed => Outcome::Failure,
        },
        score,
        duration_ms,
        iterations: job.iteration,
        error_type: None,
        task_keywords: vec![],
        context: job.request.context.clone(),
        recorded_at: chrono::Utc::now(),
    });

    Ok(IterationOutcome { decision, score, model_used: descriptor.id.clone(), duration_ms, friction: friction_signals })
}

/// Result of GENERATE → ACCUMULATE → EXECUTE → VALIDATE, folding any failure along the way
/// into a score-0 outcome with a descriptive issue rather than bubbling an error past DECIDE.
struct GenerateAndValidateOutcome {
    score: f64,
    issues: Vec<ValidationIssue>,
    build_errors: Option<Vec<String>>,
}

async fn generate_accumulate_execute_validate(
    job: &mut Job,
    deps: &IterationDeps<'_>,
    request: GenerateRequest,
) -> GenerateAndValidateOutcome {
    let generation_failure = match deps.code_gen.generate(request).await {
        Ok(resp) if resp.success => {
            for change in resp.file_changes {
                job.accumulated_files.insert(change, &deps.language_policy);
            }
            None
        }
        Ok(resp) => Some(resp.error.unwrap_or_else(|| "generation reported failure".into())),
        Err(e) => Some(e.to_string()),
    };

    if let Some(message) = generation_failure {
        return GenerateAndValidateOutcome {
            score: 0.0,
            issues: vec![ValidationIssue {
                severity: IssueSeverity::Critical,
                file: None,
                line: None,
                message: format!("code generation failed: {message}"),
                suggestion: None,
                rule: Some("generation_failure".into()),
            }],
            build_errors: None,
        };
    }

    // EXECUTE (optional)
    let mut build_errors: Option<Vec<String>> = None;
    let mut skip_validate = false;
    if let (Some(sandbox), Some(manifest)) = (&deps.sandbox, &deps.language_manifest) {
        if !manifest.skip_execution {
            let files: Vec<_> = job.accumulated_files.execution_view().into_iter().cloned().collect();
            match sandbox.run(manifest, &files).await {
                Ok(outcome) if !outcome.build.built => {
                    build_errors = Some(outcome.build.build_errors.clone());
                    skip_validate = true;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "sandbox execution failed; proceeding to validation anyway"),
            }
        }
    }

    if skip_validate {
        return GenerateAndValidateOutcome { score: 0.0, issues: Vec::new(), build_errors };
    }

    // VALIDATE
    let files: Vec<_> = job.accumulated_files.clean_for_build(&deps.language_policy).into_iter().cloned().collect();
    let validate_request = ValidateRequest {
        files,
        context: job.request.context.clone(),
        language: job.request.language.clone(),
        mode: match job.request.validation_mode {
            crate::job::ValidationMode::Standard => "standard".into(),
            crate::job::ValidationMode::Enterprise => "enterprise".into(),
        },
        original_task: job.request.task.clone(),
        workspace: job.request.workspace.clone(),
    };
    match deps.validator.validate(validate_request).await {
        Ok(response) => GenerateAndValidateOutcome {
            score: response.score,
            issues: response.issues,
            build_errors: build_errors.or(response.build_errors),
        },
        Err(e) => GenerateAndValidateOutcome {
            score: 0.0,
            issues: vec![ValidationIssue {
                severity: IssueSeverity::Critical,
                file: None,
                line: None,
                message: format!("validation call failed: {e}"),
                suggestion: None,
                rule: Some("validation_failure".into()),
            }],
            build_errors,
        },
    }
}

/// Outcome of one step-by-step mini-pipeline attempt (§4.5.1).
pub enum StepIterationOutcome {
    /// The current step is still being attempted (passed but more steps remain, or failed but
    /// within its retry budget).
    InProgress,
    /// Every step in the plan is now `Completed`.
    AllStepsCompleted { final_score: f64 },
    /// `step_order` exhausted its retry budget; the job should transition to `NeedsHelp`.
    NeedsHelp { step_order: u32 },
}

/// Parses the thinker's plan-generation response into a `TaskPlan`. Plan generation is
/// best-effort like THINK itself: a response that isn't well-formed JSON falls back to a
/// single-step plan covering the whole task, rather than blocking the job.
fn parse_task_plan(text: &str, fallback_task: &str) -> TaskPlan {
    #[derive(serde::Deserialize)]
    struct RawStep {
        description: String,
        #[serde(default)]
        target_file: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct RawPlan {
        #[serde(default)]
        required_components: Vec<String>,
        #[serde(default)]
        dependency_order: Vec<String>,
        steps: Vec<RawStep>,
    }

    let trimmed = text.trim();
    let without_fence = trimmed.strip_prefix("```json").or_else(|| trimmed.strip_prefix("```")).unwrap_or(trimmed);
    let cleaned = without_fence.strip_suffix("```").unwrap_or(without_fence).trim();

    let fallback = || TaskPlan {
        required_components: Vec::new(),
        dependency_order: Vec::new(),
        steps: vec![PlanStep { order: 1, description: fallback_task.to_string(), target_file: None, status: StepStatus::Pending }],
    };

    match serde_json::from_str::<RawPlan>(cleaned) {
        Ok(raw) if !raw.steps.is_empty() => TaskPlan {
            required_components: raw.required_components,
            dependency_order: raw.dependency_order,
            steps: raw
                .steps
                .into_iter()
                .enumerate()
                .map(|(i, s)| PlanStep {
                    order: i as u32 + 1,
                    description: s.description,
                    target_file: s.target_file,
                    status: StepStatus::Pending,
                })
                .collect(),
        },
        _ => fallback(),
    }
}

/// Runs one step-by-step mini-pipeline attempt (§4.5.1): generates the `TaskPlan` on the first
/// call, then drives `PlanStep`s one at a time through GENERATE/ACCUMULATE/EXECUTE/VALIDATE,
/// applying any pending resume hint to the prompt before retrying. A step that exhausts
/// `deps.step_retry_budget` without reaching the escalation config's acceptance thresholds
/// hands the job to `NeedsHelp` instead of failing outright.
pub async fn run_step_iteration(
    job: &mut Job,
    deps: &IterationDeps<'_>,
    unlocked_tiers: &[Tier],
    history_signals: &mut Vec<IterationSignal>,
) -> Result<StepIterationOutcome, IterationError> {
    let started = Instant::now();
    job.iteration += 1;

    if job.plan.is_none() {
        let guidance = think_with_failsafe(deps, job).await.unwrap_or_default();
        job.plan = Some(parse_task_plan(&guidance, &job.request.task));
    }

    let help = job.pending_help.take();
    if let Some(HelpResponse { skip_step: true, .. }) = &help {
        if let Some(plan) = job.plan.as_mut() {
            if let Some(order) = plan.next_pending_step().map(|s| s.order) {
                let _ = plan.complete_step(order);
            }
        }
    }

    let step = match job.plan.as_ref().and_then(TaskPlan::next_pending_step) {
        Some(s) => s.clone(),
        None => {
            let final_score = job.history.last().map(|h| h.score).unwrap_or(0.0);
            return Ok(StepIterationOutcome::AllStepsCompleted { final_score });
        }
    };

    // Step retries reattempt the same step rather than escalating through the catalog the way
    // batch mode does, so (unlike `run_iteration`) nothing is excluded here: a single-model tier
    // must still be able to retry a stuck step up to `step_retry_budget` times.
    let hint = SelectionHint { language: job.request.language.clone(), complexity: None, keywords: vec![] };
    let excluded = HashSet::new();
    let selector = Selector::new(deps.registry, deps.performance_store);
    let descriptor = selector
        .select_next(Purpose::CodeGeneration, &excluded, unlocked_tiers, &hint, deps.weight_budget)
        .ok_or(IterationError::AllModelsExhausted)?;

    let previous_feedback = job.history.last().map(|h| PreviousFeedback {
        score: h.score,
        issues: h.issues.clone(),
        summary: None,
        build_errors: h.build_errors.clone(),
    });

    let mut task = format!("{}\nStep {}: {}", job.request.task, step.order, step.description);
    let mut target_files = step.target_file.clone().map(|f| vec![f]);
    if let Some(help) = &help {
        if let Some(h) = &help.hint {
            task.push_str(&format!("\nUser guidance: {h}"));
        }
        if let Some(snippet) = &help.code_snippet {
            task.push_str(&format!("\nUser-provided code:\n{snippet}"));
        }
        if let Some(focus) = &help.focus_file {
            target_files = Some(vec![focus.clone()]);
        }
    }

    let request = GenerateRequest {
        task,
        language: job.request.language.clone(),
        context: job.request.context.clone(),
        previous_feedback,
        accumulated_files: job.accumulated_files.execution_view().into_iter().cloned().collect(),
        target_files,
        workspace: job.request.workspace.clone(),
        thinker_guidance: None,
        execution_capabilities: deps.sandbox.is_some(),
    };

    let outcome = generate_accumulate_execute_validate(job, deps, request).await;
    let score = outcome.score;
    let issues = outcome.issues;
    let build_errors = outcome.build_errors;

    let attempts_so_far = {
        let count = job.step_attempts.entry(step.order).or_insert(0);
        *count += 1;
        *count
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    job.history.push(AttemptHistory {
        iteration: job.iteration,
        model: descriptor.id.clone(),
        score,
        issues: issues.clone(),
        build_errors,
        duration_ms,
        recorded_at: chrono::Utc::now(),
    });

    history_signals.push(IterationSignal {
        categories: issues.iter().filter_map(|i| i.rule.clone()).collect(),
        error_count: issues.len(),
    });
    let friction_signals = friction::detect(history_signals);

    job.push_phase(PhaseInfo {
        name: "iterate_step".into(),
        iteration: Some(job.iteration),
        started_at: chrono::Utc::now(),
        completed_at: Some(chrono::Utc::now()),
        duration_ms: Some(duration_ms),
        status: PhaseStatus::Completed,
        details: Some(serde_json::json!({ "friction": friction_signals, "score": score, "step": step.order })),
    });

    info!(job_id = %job.id, iteration = job.iteration, step = step.order, score, model = %descriptor.id, "step iteration decided");

    deps.performance_store.record(PerformanceRecord {
        model: descriptor.id.clone(),
        task_type: "code_generation".into(),
        language: job.request.language.clone().unwrap_or_else(|| "unknown".into()),
        complexity: Complexity::Moderate,
        outcome: if score >= deps.escalation_config.min_score { Outcome::Success } else { Outcome::Partial },
        score,
        duration_ms,
        iterations: job.iteration,
        error_type: None,
        task_keywords: vec![],
        context: job.request.context.clone(),
        recorded_at: chrono::Utc::now(),
    });

    let accepted = score >= deps.escalation_config.min_score
        || (score >= deps.escalation_config.floor_score && attempts_so_far >= deps.escalation_config.floor_min_iteration);

    if accepted {
        if let Some(plan) = job.plan.as_mut() {
            let _ = plan.complete_step(step.order);
            if plan.all_completed() {
                return Ok(StepIterationOutcome::AllStepsCompleted { final_score: score });
            }
        }
        return Ok(StepIterationOutcome::InProgress);
    }

    if attempts_so_far >= deps.step_retry_budget {
        return Ok(StepIterationOutcome::NeedsHelp { step_order: step.order });
    }

    Ok(StepIterationOutcome::InProgress)
}

async fn think_with_failsafe(deps: &IterationDeps<'_>, job: &Job) -> Option<String> {
    let thinker = deps.thinker.as_ref()?;
    let history: Vec<ThinkHistoryEntry> = job
        .history
        .iter()
        .map(|h| ThinkHistoryEntry { iteration: h.iteration, summary: format!("score {:.1}", h.score) })
        .collect();
    let summary = format!("{} files accumulated", job.accumulated_files.len());
    match thinker.think(&job.request.task, &job.request.context, &history, &summary).await {
        Ok(guidance) => Some(guidance),
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "thinker call failed — proceeding without guidance");
            None
        }
    }
}

/// Errors bubbled up when sandbox materialization itself cannot proceed (distinct from a
/// normal non-zero build exit, which is folded into `ValidateResponse`-shaped feedback).
pub fn describe_main_file(manifest: &LanguageManifest, files: &[&crate::accumulator::FileChange]) -> Option<String> {
    sandbox::detect_main_file(files, &manifest.main_file_patterns).map(|f| f.path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_main_file_delegates_to_sandbox_detection() {
        let manifest = LanguageManifest {
            image: "x".into(),
            file_extension: "cs".into(),
            build_command: "".into(),
            run_command: "".into(),
            main_file_patterns: vec!["*Program.cs".into()],
            skip_execution: false,
            cpu_limit_millis: 1000,
            memory_limit_mb: 256,
            wallclock_timeout: std::time::Duration::from_secs(10),
        };
        let file = crate::accumulator::FileChange {
            path: "src/Program.cs".into(),
            content: String::new(),
            change_type: crate::accumulator::ChangeType::Created,
            reason: None,
        };
        let files = vec![&file];
        assert_eq!(describe_main_file(&manifest, &files), Some("src/Program.cs".into()));
    }

    #[test]
    fn parse_task_plan_reads_a_wellformed_plan() {
        let text = r#"{
            "required_components": ["Calculator"],
            "dependency_order": ["Calculator.cs"],
            "steps": [
                {"description": "implement add", "target_file": "Calculator.cs"},
                {"description": "implement subtract"}
            ]
        }"#;
        let plan = parse_task_plan(text, "fallback task");
        assert_eq!(plan.required_components, vec!["Calculator".to_string()]);
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].order, 1);
        assert_eq!(plan.steps[0].target_file.as_deref(), Some("Calculator.cs"));
        assert_eq!(plan.steps[1].order, 2);
        assert_eq!(plan.steps[1].target_file, None);
    }

    #[test]
    fn parse_task_plan_strips_markdown_fences() {
        let text = "```json\n{\"steps\": [{\"description\": \"do it\"}]}\n```";
        let plan = parse_task_plan(text, "fallback task");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].description, "do it");
    }

    #[test]
    fn parse_task_plan_falls_back_to_a_single_step_on_malformed_input() {
        let plan = parse_task_plan("not json at all", "do the whole task");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].description, "do the whole task");
        assert_eq!(plan.steps[0].order, 1);
    }

    #[test]
    fn parse_task_plan_falls_back_when_the_steps_array_is_empty() {
        let plan = parse_task_plan(r#"{"steps": []}"#, "do the whole task");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].description, "do the whole task");
    }

    struct FailingCodeGen;

    #[async_trait::async_trait]
    impl CodeGenClient for FailingCodeGen {
        async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse, crate::collaborators::CollaboratorError> {
            Err(crate::collaborators::CollaboratorError::Transient { endpoint: "codegen".into(), message: "codegen endpoint down".into() })
        }
    }

    struct FailingValidator;

    #[async_trait::async_trait]
    impl ValidatorClient for FailingValidator {
        async fn validate(&self, _request: ValidateRequest) -> Result<crate::collaborators::ValidateResponse, crate::collaborators::CollaboratorError> {
            Err(crate::collaborators::CollaboratorError::Transient { endpoint: "validator".into(), message: "validator endpoint down".into() })
        }
    }

    struct SucceedingCodeGen;

    #[async_trait::async_trait]
    impl CodeGenClient for SucceedingCodeGen {
        async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse, crate::collaborators::CollaboratorError> {
            Ok(GenerateResponse {
                success: true,
                file_changes: vec![],
                explanation: None,
                error: None,
                tokens_used: 0,
                model_used: "test".into(),
                execution: None,
                cloud_usage: None,
            })
        }
    }

    fn test_job() -> Job {
        Job::new(
            "job-1".into(),
            crate::job::JobRequest {
                task: "do something".into(),
                context: "ctx".into(),
                workspace: "ws".into(),
                language: None,
                max_iterations: 10,
                min_score: 8.0,
                validation_mode: crate::job::ValidationMode::Standard,
                execution_mode: crate::job::ExecutionMode::Batch,
                auto_write_files: true,
            },
        )
    }

    fn test_request() -> GenerateRequest {
        GenerateRequest {
            task: "do something".into(),
            language: None,
            context: "ctx".into(),
            previous_feedback: None,
            accumulated_files: vec![],
            target_files: None,
            workspace: "ws".into(),
            thinker_guidance: None,
            execution_capabilities: false,
        }
    }

    #[tokio::test]
    async fn generation_failure_folds_into_a_score_zero_outcome() {
        let mut job = test_job();
        let registry = ModelRegistry::new(vec![]);
        let store = PerformanceStore::new();
        let deps = IterationDeps {
            registry: &registry,
            performance_store: &store,
            thinker: None,
            code_gen: Arc::new(FailingCodeGen),
            validator: Arc::new(SucceedingValidator),
            sandbox: None,
            language_manifest: None,
            language_policy: LanguagePolicy::generic(),
            escalation_config: EscalationConfig::default(),
            weight_budget: 100,
            step_retry_budget: 10,
        };

        let outcome = generate_accumulate_execute_validate(&mut job, &deps, test_request()).await;

        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].rule.as_deref(), Some("generation_failure"));
        assert_eq!(outcome.issues[0].severity, IssueSeverity::Critical);
    }

    #[tokio::test]
    async fn validation_call_failure_folds_into_a_score_zero_outcome() {
        let mut job = test_job();
        let registry = ModelRegistry::new(vec![]);
        let store = PerformanceStore::new();
        let deps = IterationDeps {
            registry: &registry,
            performance_store: &store,
            thinker: None,
            code_gen: Arc::new(SucceedingCodeGen),
            validator: Arc::new(FailingValidator),
            sandbox: None,
            language_manifest: None,
            language_policy: LanguagePolicy::generic(),
            escalation_config: EscalationConfig::default(),
            weight_budget: 100,
            step_retry_budget: 10,
        };

        let outcome = generate_accumulate_execute_validate(&mut job, &deps, test_request()).await;

        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].rule.as_deref(), Some("validation_failure"));
    }

    struct SucceedingValidator;

    #[async_trait::async_trait]
    impl ValidatorClient for SucceedingValidator {
        async fn validate(&self, _request: ValidateRequest) -> Result<crate::collaborators::ValidateResponse, crate::collaborators::CollaboratorError> {
            Ok(crate::collaborators::ValidateResponse {
                passed: true,
                score: 9.0,
                issues: vec![],
                suggestions: vec![],
                summary: None,
                build_errors: None,
                confidence: 1.0,
                models_used: vec!["test".into()],
                ensemble_results: None,
            })
        }
    }
}
