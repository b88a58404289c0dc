//! MCP server exposing the job orchestrator's management surface (§6.2): submit, status,
//! cancel, list, help, health — each a typed MCP tool call over stdio.
//!
//! Grounded on `coordination/src/main.rs`'s `RustClusterServer`: a plain struct holding
//! shared state, a `#[tool_router] impl` block of `#[tool]` methods taking
//! `Parameters<XRequest>`, and a manual `impl ServerHandler` supplying `get_info`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use forge_agent::clients::{HttpMemoryClient, ProcessSandboxAdapter, RigCodeGenClient, RigThinkerClient, RigValidatorClient};
use forge_agent::config::{check_endpoint, AgentConfig, ClientSet};
use forge_core::{
    EscalationConfig, FileSystemPersistence, HelpResponse, IterationDeps, JobManager, JobRequest, LanguagePolicy,
    ManagerError, ModelDescriptor, ModelRegistry, PersistenceLayer, Purpose, Tier,
};
use rmcp::{
    handler::server::wrapper::Parameters,
    model::{ServerCapabilities, ServerInfo},
    schemars, tool, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use tokio::io::{stdin, stdout};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Maximum jobs running concurrently (overrides ORCHESTRATOR_MAX_CONCURRENT_JOBS).
    #[arg(long)]
    max_concurrent_jobs: Option<u32>,

    /// FIFO queue capacity (overrides ORCHESTRATOR_QUEUE_CAPACITY).
    #[arg(long)]
    queue_capacity: Option<u32>,

    /// Directory holding persisted job state (§4.7).
    #[arg(long, default_value = "./forge-jobs")]
    persistence_dir: std::path::PathBuf,

    /// Path to a TOML model catalog (§6.3). When absent, a minimal built-in catalog is used.
    #[arg(long)]
    model_catalog: Option<std::path::PathBuf>,
}

fn default_catalog(config: &AgentConfig) -> Vec<ModelDescriptor> {
    let mut catalog = vec![
        ModelDescriptor {
            id: config.local_endpoint.model.clone(),
            purpose: Purpose::CodeGeneration,
            tier: Tier::Local,
            approximate_weight: 1,
            priority: 0,
            supported_languages: None,
        },
        ModelDescriptor {
            id: config.thinker_endpoint.model.clone(),
            purpose: Purpose::Thinking,
            tier: Tier::Local,
            approximate_weight: 1,
            priority: 0,
            supported_languages: None,
        },
        ModelDescriptor {
            id: config.validator_endpoint.model.clone(),
            purpose: Purpose::Validation,
            tier: Tier::Local,
            approximate_weight: 1,
            priority: 0,
            supported_languages: None,
        },
    ];
    if let Some(cloud) = &config.cloud_endpoint {
        catalog.push(ModelDescriptor {
            id: cloud.model.clone(),
            purpose: Purpose::CodeGeneration,
            tier: Tier::Cloud,
            approximate_weight: 4,
            priority: 0,
            supported_languages: None,
        });
    }
    if let Some(premium) = &config.premium_endpoint {
        catalog.push(ModelDescriptor {
            id: premium.model.clone(),
            purpose: Purpose::CodeGeneration,
            tier: Tier::Premium,
            approximate_weight: 10,
            priority: 0,
            supported_languages: None,
        });
    }
    catalog
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SubmitRequest {
    #[schemars(description = "The code generation task, 10..10000 characters")]
    task: String,
    #[schemars(description = "Opaque identifier matching ^[A-Za-z0-9_.-]+$, 1..200 characters")]
    context: String,
    #[schemars(description = "Workspace path, 1..500 characters, must not contain '..' or '~'")]
    workspace: String,
    #[schemars(description = "Target language, one of the enumerated set")]
    language: Option<String>,
    #[schemars(description = "Maximum retry iterations, 1..1000 (default 10)")]
    max_iterations: Option<u32>,
    #[schemars(description = "Minimum acceptable validation score, 0..10 (default 8.0)")]
    min_score: Option<f64>,
    #[schemars(description = "\"standard\" or \"enterprise\" (default \"standard\")")]
    validation_mode: Option<String>,
    #[schemars(description = "Write accepted files to the workspace when done (default true)")]
    auto_write_files: Option<bool>,
    #[schemars(description = "\"batch\" or \"stepbystep\" (default \"batch\")")]
    execution_mode: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct JobIdRequest {
    #[schemars(description = "Job id returned by submit")]
    job_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListRequest {}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct HelpRequest {
    #[schemars(description = "Job id currently in the NeedsHelp state")]
    job_id: String,
    #[schemars(description = "Free-text hint merged into the stuck step's next prompt")]
    hint: Option<String>,
    #[schemars(description = "Optional code snippet merged into the stuck step's next prompt")]
    code_snippet: Option<String>,
    #[schemars(description = "Optional file to focus the next attempt on")]
    focus_file: Option<String>,
    #[schemars(description = "Skip the stuck step instead of retrying it (default false)")]
    skip_step: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct HealthRequest {}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_kind: String,
    message: String,
}

fn manager_error_body(err: &ManagerError) -> ErrorBody {
    let error_kind = match err {
        ManagerError::NotFound(_) => "not_found",
        ManagerError::TerminalConflict(_) => "conflict",
        ManagerError::Overloaded(_) => "overloaded",
        ManagerError::Admission(_) => "invalid_request",
    };
    ErrorBody { error_kind: error_kind.to_string(), message: err.to_string() }
}

/// Everything one running job needs from `IterationDeps`, held so a background task can
/// reassemble it without borrowing the server.
#[derive(Clone)]
struct Collaborators {
    registry: Arc<ModelRegistry>,
    performance_store: Arc<forge_core::PerformanceStore>,
    thinker: Arc<dyn forge_core::ThinkerClient>,
    code_gen: Arc<dyn forge_core::CodeGenClient>,
    validator: Arc<dyn forge_core::ValidatorClient>,
    sandbox: Option<Arc<dyn forge_core::SandboxAdapter>>,
    escalation_config: EscalationConfig,
    weight_budget: u32,
    step_retry_budget: u32,
}

struct ForgeAgentServer {
    manager: Arc<JobManager>,
    persistence: Arc<dyn PersistenceLayer>,
    collaborators: Collaborators,
    config: AgentConfig,
}

impl ForgeAgentServer {
    /// Fire-and-forget dispatch of the next queued job, grounded on `manager.rs`'s own
    /// documented idiom for spawning independent per-job work off a bounded pool. The dispatch
    /// permit is held for the job's full lifetime so `max_concurrent_jobs` is actually enforced.
    fn spawn_job_runner(&self) {
        let manager = self.manager.clone();
        let persistence = self.persistence.clone();
        let collaborators = self.collaborators.clone();

        tokio::spawn(async move {
            let Some((job_id, _permit)) = manager.try_dispatch_next().await else {
                return;
            };
            let deps = collaborators.iteration_deps();
            match manager.run_job(&job_id, &deps, persistence.as_ref()).await {
                Ok(state) => tracing::info!(job_id, ?state, "job reached terminal state"),
                Err(e) => tracing::warn!(job_id, error = %e, "job run failed"),
            }
        });
    }

    /// Redispatches a job resuming from `NeedsHelp` (§6.2 `help`): acquires a dispatch permit
    /// outside the FIFO queue, since the job was already admitted and is not waiting in line.
    fn spawn_resumed_job_runner(&self, job_id: String) {
        let manager = self.manager.clone();
        let persistence = self.persistence.clone();
        let collaborators = self.collaborators.clone();

        tokio::spawn(async move {
            let Some(_permit) = manager.acquire_dispatch_permit().await else {
                return;
            };
            let deps = collaborators.iteration_deps();
            match manager.run_job(&job_id, &deps, persistence.as_ref()).await {
                Ok(state) => tracing::info!(job_id, ?state, "resumed job reached terminal state"),
                Err(e) => tracing::warn!(job_id, error = %e, "resumed job run failed"),
            }
        });
    }
}

impl Collaborators {
    fn iteration_deps(&self) -> IterationDeps<'_> {
        IterationDeps {
            registry: &self.registry,
            performance_store: &self.performance_store,
            thinker: Some(self.thinker.clone()),
            code_gen: self.code_gen.clone(),
            validator: self.validator.clone(),
            sandbox: self.sandbox.clone(),
            language_manifest: None,
            language_policy: LanguagePolicy::generic(),
            escalation_config: self.escalation_config.clone(),
            weight_budget: self.weight_budget,
            step_retry_budget: self.step_retry_budget,
        }
    }
}

#[tool_router]
impl ForgeAgentServer {
    #[tool(description = "Submit a new code generation job. Returns immediately with a job id; the job runs in the background through THINK/SELECT/GENERATE/ACCUMULATE/EXECUTE/VALIDATE/DECIDE until it completes, fails, or needs help.")]
    async fn submit(&self, Parameters(req): Parameters<SubmitRequest>) -> Result<String, String> {
        let validation_mode = match req.validation_mode.as_deref() {
            Some("enterprise") => forge_core::ValidationMode::Enterprise,
            _ => forge_core::ValidationMode::Standard,
        };
        let execution_mode = match req.execution_mode.as_deref() {
            Some("stepbystep") => forge_core::ExecutionMode::StepByStep,
            _ => forge_core::ExecutionMode::Batch,
        };
        let request = JobRequest {
            task: req.task,
            context: req.context,
            workspace: req.workspace,
            language: req.language,
            max_iterations: req.max_iterations.unwrap_or(10),
            min_score: req.min_score.unwrap_or(8.0),
            validation_mode,
            execution_mode,
            auto_write_files: req.auto_write_files.unwrap_or(true),
        };
        let job_id = Uuid::new_v4().to_string();
        match self.manager.admit(request, job_id.clone()).await {
            Ok(job_id) => {
                self.spawn_job_runner();
                serde_json::to_string(&serde_json::json!({ "job_id": job_id })).map_err(|e| e.to_string())
            }
            Err(e) => serde_json::to_string(&manager_error_body(&e)).map_err(|e| e.to_string()),
        }
    }

    #[tool(description = "Fetch the full status record for a job: state, progress, iteration count, timeline, and attempt history.", annotations(read_only_hint = true))]
    async fn status(&self, Parameters(req): Parameters<JobIdRequest>) -> Result<String, String> {
        match self.manager.snapshot(&req.job_id).await {
            Ok(job) => serde_json::to_string(&job).map_err(|e| e.to_string()),
            Err(e) => serde_json::to_string(&manager_error_body(&e)).map_err(|e| e.to_string()),
        }
    }

    #[tool(description = "Cancel a running or queued job. Cancellation is cooperative: the job stops at its next iteration boundary. Cancelling an already-terminal job returns a conflict error.", annotations(destructive_hint = true))]
    async fn cancel(&self, Parameters(req): Parameters<JobIdRequest>) -> Result<String, String> {
        match self.manager.cancel(&req.job_id).await {
            Ok(()) => serde_json::to_string(&serde_json::json!({ "cancelled": req.job_id })).map_err(|e| e.to_string()),
            Err(e) => serde_json::to_string(&manager_error_body(&e)).map_err(|e| e.to_string()),
        }
    }

    #[tool(description = "List all known job ids.", annotations(read_only_hint = true))]
    async fn list(&self, Parameters(_req): Parameters<ListRequest>) -> Result<String, String> {
        let ids = self.manager.list_ids().await;
        serde_json::to_string(&ids).map_err(|e| e.to_string())
    }

    #[tool(description = "Resume a job that is in the NeedsHelp state (§6.2), merging a free-text hint, optional code snippet, and optional focus file into the stuck step's next prompt, or skipping the step outright. Returns a conflict error if the job is not currently NeedsHelp.")]
    async fn help(&self, Parameters(req): Parameters<HelpRequest>) -> Result<String, String> {
        let response = HelpResponse {
            hint: req.hint,
            code_snippet: req.code_snippet,
            focus_file: req.focus_file,
            skip_step: req.skip_step.unwrap_or(false),
        };
        match self.manager.resume(&req.job_id, response).await {
            Ok(()) => {
                self.spawn_resumed_job_runner(req.job_id.clone());
                serde_json::to_string(&serde_json::json!({ "resumed": req.job_id })).map_err(|e| e.to_string())
            }
            Err(e) => serde_json::to_string(&manager_error_body(&e)).map_err(|e| e.to_string()),
        }
    }

    #[tool(description = "Check reachability of every configured collaborator endpoint.", annotations(read_only_hint = true))]
    async fn health(&self, Parameters(_req): Parameters<HealthRequest>) -> Result<String, String> {
        let local = check_endpoint(&self.config.local_endpoint.url, Some(&self.config.local_endpoint.api_key)).await;
        let thinker = check_endpoint(&self.config.thinker_endpoint.url, Some(&self.config.thinker_endpoint.api_key)).await;
        let validator = check_endpoint(&self.config.validator_endpoint.url, Some(&self.config.validator_endpoint.api_key)).await;
        let cloud = match &self.config.cloud_endpoint {
            Some(ep) => Some(check_endpoint(&ep.url, Some(&ep.api_key)).await),
            None => None,
        };
        let premium = match &self.config.premium_endpoint {
            Some(ep) => Some(check_endpoint(&ep.url, Some(&ep.api_key)).await),
            None => None,
        };
        serde_json::to_string(&serde_json::json!({
            "local": local,
            "thinker": thinker,
            "validator": validator,
            "cloud": cloud,
            "premium": premium,
        }))
        .map_err(|e| e.to_string())
    }
}

const HELP_TEXT: &str = "forge-agent management surface (§6.2):\n\
- submit(task, context, workspace, language?, max_iterations?, min_score?, validation_mode?, auto_write_files?, execution_mode?) -> {job_id}\n\
- status(job_id) -> full job record\n\
- cancel(job_id) -> cooperative cancellation, idempotent\n\
- list() -> all known job ids\n\
- help(job_id, hint?, code_snippet?, focus_file?, skip_step?) -> resumes a NeedsHelp job\n\
- health() -> per-endpoint reachability\n\
Errors are returned as JSON bodies with an error_kind of not_found, conflict, overloaded, or invalid_request.";

impl ServerHandler for ForgeAgentServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(format!(
                "MCP server driving the code-generation job orchestrator: submit a task, poll status, cancel, or list jobs. \
                 Jobs run in the background through an escalating multi-model retry loop, pausing at NeedsHelp in step-by-step \
                 mode when a step exhausts its retry budget.\n\n{HELP_TEXT}"
            )),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("forge_agent=info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting forge-agent MCP server");

    let app_config = forge_core::config::load_from_env().context("failed to load orchestrator configuration")?;
    let agent_config = AgentConfig::default();
    let client_set = ClientSet::from_config(&agent_config)?;

    let catalog = match &args.model_catalog {
        Some(path) => forge_core::config::load_catalog(path).context("failed to load model catalog")?.models,
        None => default_catalog(&agent_config),
    };
    let registry = Arc::new(ModelRegistry::new(catalog));
    registry.validate().context("model catalog is missing a required purpose")?;

    let breaker = Arc::new(forge_core::CircuitBreaker::default());
    let retry = forge_core::RetryPolicy::new(app_config.resilience.retry_attempts);

    let code_gen: Arc<dyn forge_core::CodeGenClient> = Arc::new(RigCodeGenClient::new(
        client_set.local,
        agent_config.local_endpoint.model.clone(),
        "code_gen".to_string(),
        breaker.clone(),
        retry,
    ));
    let thinker: Arc<dyn forge_core::ThinkerClient> = Arc::new(RigThinkerClient::new(
        client_set.thinker,
        agent_config.thinker_endpoint.model.clone(),
        "thinker".to_string(),
        breaker.clone(),
        retry,
    ));
    let validator: Arc<dyn forge_core::ValidatorClient> = Arc::new(RigValidatorClient::new(
        client_set.validator,
        agent_config.validator_endpoint.model.clone(),
        "validator".to_string(),
        breaker.clone(),
        retry,
    ));
    let sandbox: Option<Arc<dyn forge_core::SandboxAdapter>> = Some(Arc::new(ProcessSandboxAdapter::new()));

    let _memory: Option<Arc<dyn forge_core::MemoryClient>> = agent_config
        .memory_endpoint
        .as_ref()
        .map(|ep| Arc::new(HttpMemoryClient::new(ep.url.clone(), Some(ep.api_key.clone()))) as Arc<dyn forge_core::MemoryClient>);

    std::fs::create_dir_all(&args.persistence_dir).context("failed to create persistence directory")?;
    let persistence: Arc<dyn PersistenceLayer> = Arc::new(FileSystemPersistence::new(args.persistence_dir.clone()));

    // §4.7: on start, scan all persisted jobs and resurrect or retire them before accepting
    // new work.
    let retention = chrono::Duration::days(app_config.orchestrator.retention_days as i64);
    match forge_core::persistence::restart_scan(persistence.as_ref(), chrono::Utc::now(), retention).await {
        Ok(policies) => {
            for (job_id, policy) in &policies {
                tracing::info!(job_id, ?policy, "restart scan decided resurrection policy");
            }
        }
        Err(e) => tracing::warn!(error = %e, "restart scan failed; continuing with an empty job set"),
    }

    let manager = Arc::new(JobManager::new(
        args.max_concurrent_jobs.unwrap_or(app_config.orchestrator.max_concurrent_jobs),
        args.queue_capacity.unwrap_or(app_config.orchestrator.queue_capacity),
    ));

    let server = ForgeAgentServer {
        manager,
        persistence,
        collaborators: Collaborators {
            registry,
            performance_store: Arc::new(forge_core::PerformanceStore::new()),
            thinker,
            code_gen,
            validator,
            sandbox,
            escalation_config: EscalationConfig {
                min_score: app_config.iteration.min_acceptable_score as f64,
                floor_score: app_config.iteration.floor_score,
                floor_min_iteration: app_config.iteration.floor_after_attempts,
                tier1_threshold: app_config.escalation.tier1_threshold,
                tier2_threshold: app_config.escalation.tier2_threshold,
            },
            weight_budget: app_config.models.weight_budget,
            step_retry_budget: app_config.iteration.step_retry_budget,
        },
        config: agent_config,
    };

    let transport = (stdin(), stdout());
    let service = server.serve(transport).await?;
    service.waiting().await?;

    Ok(())
}
