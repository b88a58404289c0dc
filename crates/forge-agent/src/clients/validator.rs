//! Rig-backed `ValidatorClient` (§6.1): blind code review, parsed into the richer
//! `ValidateResponse` shape (score, issues, suggestions) rather than the teacher's plain
//! PASS/FAIL text.
//!
//! Grounded on `validator.rs`'s "blind review" design (the validator sees only the
//! resulting files, never the generation conversation, to avoid rubber-stamping), generalized
//! from a pass/fail text response to a scored JSON response.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

use forge_core::collaborators::{CollaboratorError, ValidateRequest, ValidateResponse, ValidationIssue, ValidatorClient};
use forge_core::resilience::{call_with_resilience, CircuitBreaker, RetryPolicy};

use super::classify_transport_error;

const PREAMBLE: &str = "You are a blind code reviewer: you see only the resulting files, \
    never the conversation that produced them. Review for correctness, style, and potential \
    bugs against the stated task. Respond with ONLY a JSON object, no surrounding prose or \
    markdown fences, of the shape: {\"passed\": bool, \"score\": number 0-10, \"issues\": \
    [{\"severity\": \"info\"|\"warning\"|\"error\"|\"critical\", \"file\": string|null, \
    \"line\": number|null, \"message\": string, \"suggestion\": string|null, \"rule\": \
    string|null}], \"suggestions\": [string], \"summary\": string|null, \"confidence\": \
    number 0-1}.";

pub struct RigValidatorClient {
    client: openai::CompletionsClient,
    model: String,
    endpoint: String,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl RigValidatorClient {
    pub fn new(client: openai::CompletionsClient, model: String, endpoint: String, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self { client, model, endpoint, breaker, retry }
    }
}

#[async_trait]
impl ValidatorClient for RigValidatorClient {
    async fn validate(&self, request: ValidateRequest) -> Result<ValidateResponse, CollaboratorError> {
        let mut prompt = format!(
            "Task: {}\nWorkspace: {}\nMode: {}\n",
            request.original_task, request.workspace, request.mode
        );
        if let Some(lang) = &request.language {
            prompt.push_str(&format!("Language: {lang}\n"));
        }
        prompt.push_str("Files:\n");
        for file in &request.files {
            prompt.push_str(&format!("--- {} ---\n{}\n", file.path, file.content));
        }

        let agent = self.client.agent(&self.model).preamble(PREAMBLE).build();
        let response = call_with_resilience(
            &self.breaker,
            self.retry,
            &self.endpoint,
            |e: &String| classify_transport_error(e),
            |ep| format!("circuit breaker open for {ep}"),
            || {
                let agent = &agent;
                let prompt = prompt.clone();
                async move { agent.prompt(prompt).await.map_err(|e| e.to_string()) }
            },
        )
        .await
        .map_err(|message| CollaboratorError::Transient { endpoint: self.endpoint.clone(), message })?;

        parse_validation(&response, self.model.clone()).map_err(|message| CollaboratorError::Permanent { endpoint: self.endpoint.clone(), message })
    }
}

#[derive(serde::Deserialize)]
struct RawValidation {
    passed: bool,
    score: f64,
    #[serde(default)]
    issues: Vec<ValidationIssue>,
    #[serde(default)]
    suggestions: Vec<String>,
    summary: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

fn parse_validation(response: &str, model: String) -> Result<ValidateResponse, String> {
    let trimmed = strip_markdown_fence(response.trim());
    let raw: RawValidation = serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
    Ok(ValidateResponse {
        passed: raw.passed,
        score: raw.score,
        issues: raw.issues,
        suggestions: raw.suggestions,
        summary: raw.summary,
        build_errors: None,
        confidence: raw.confidence,
        models_used: vec![model],
        ensemble_results: None,
    })
}

fn strip_markdown_fence(text: &str) -> &str {
    let without_leading = text.strip_prefix("```json").or_else(|| text.strip_prefix("```")).unwrap_or(text);
    without_leading.strip_suffix("```").unwrap_or(without_leading).trim()
}
