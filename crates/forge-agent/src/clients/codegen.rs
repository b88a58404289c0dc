//! Rig-backed `CodeGenClient` (§6.1): prompts a code-gen model for a JSON array of file
//! changes and parses the response into `GenerateResponse`.
//!
//! Grounded on `validator.rs`'s thin client-struct shape (one rig `CompletionsClient` plus a
//! model name) and `orchestrator.rs`'s `prompt_with_retry`, generalized into the shared
//! resilience envelope.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::warn;

use forge_core::accumulator::{ChangeType, FileChange};
use forge_core::collaborators::{CodeGenClient, CollaboratorError, GenerateRequest, GenerateResponse};
use forge_core::resilience::{call_with_resilience, CircuitBreaker, RetryPolicy};

use super::classify_transport_error;

const PREAMBLE: &str = "You are a code generation engine. Given a task, context, and any \
    previous validation feedback, produce the file changes needed. Respond with ONLY a JSON \
    array, no surrounding prose or markdown fences, where each element has the shape: \
    {\"path\": string, \"content\": string, \"change_type\": \"created\"|\"modified\"|\"deleted\", \
    \"reason\": string|null}.";

pub struct RigCodeGenClient {
    client: openai::CompletionsClient,
    model: String,
    endpoint: String,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl RigCodeGenClient {
    pub fn new(client: openai::CompletionsClient, model: String, endpoint: String, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self { client, model, endpoint, breaker, retry }
    }

    fn build_prompt(&self, request: &GenerateRequest) -> String {
        let mut prompt = format!("Task: {}\nWorkspace: {}\nContext: {}\n", request.task, request.workspace, request.context);
        if let Some(lang) = &request.language {
            prompt.push_str(&format!("Language: {lang}\n"));
        }
        if let Some(guidance) = &request.thinker_guidance {
            prompt.push_str(&format!("Guidance: {guidance}\n"));
        }
        if let Some(feedback) = &request.previous_feedback {
            prompt.push_str(&format!(
                "Previous score: {:.1}\nPrevious issues: {}\n",
                feedback.score,
                feedback.issues.iter().map(|i| i.message.as_str()).collect::<Vec<_>>().join("; ")
            ));
            if let Some(errors) = &feedback.build_errors {
                prompt.push_str(&format!("Previous build errors: {}\n", errors.join("; ")));
            }
        }
        if !request.accumulated_files.is_empty() {
            prompt.push_str("Current files:\n");
            for file in &request.accumulated_files {
                prompt.push_str(&format!("--- {} ---\n{}\n", file.path, file.content));
            }
        }
        if let Some(targets) = &request.target_files {
            prompt.push_str(&format!("Focus on: {}\n", targets.join(", ")));
        }
        prompt
    }
}

#[async_trait]
impl CodeGenClient for RigCodeGenClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, CollaboratorError> {
        let prompt = self.build_prompt(&request);
        let agent = self.client.agent(&self.model).preamble(PREAMBLE).build();
        let endpoint = self.endpoint.clone();

        let response = call_with_resilience(
            &self.breaker,
            self.retry,
            &endpoint,
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

        match parse_file_changes(&response) {
            Ok(file_changes) => Ok(GenerateResponse {
                success: true,
                file_changes,
                explanation: None,
                error: None,
                tokens_used: 0,
                model_used: self.model.clone(),
                execution: None,
                cloud_usage: None,
            }),
            Err(parse_error) => {
                warn!(endpoint = %self.endpoint, error = %parse_error, "code-gen response was not valid JSON file-change array");
                Ok(GenerateResponse {
                    success: false,
                    file_changes: Vec::new(),
                    explanation: Some(response),
                    error: Some(parse_error),
                    tokens_used: 0,
                    model_used: self.model.clone(),
                    execution: None,
                    cloud_usage: None,
                })
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct RawFileChange {
    path: String,
    content: String,
    change_type: String,
    reason: Option<String>,
}

fn parse_file_changes(response: &str) -> Result<Vec<FileChange>, String> {
    let trimmed = strip_markdown_fence(response.trim());
    let raw: Vec<RawFileChange> = serde_json::from_str(trimmed).map_err(|e| e.to_string())?;
    raw.into_iter()
        .map(|r| {
            let change_type = match r.change_type.as_str() {
                "created" => ChangeType::Created,
                "modified" => ChangeType::Modified,
                "deleted" => ChangeType::Deleted,
                other => return Err(format!("unknown change_type {other:?}")),
            };
            Ok(FileChange { path: r.path, content: r.content, change_type, reason: r.reason })
        })
        .collect()
}

fn strip_markdown_fence(text: &str) -> &str {
    let without_leading = text.strip_prefix("```json").or_else(|| text.strip_prefix("```")).unwrap_or(text);
    without_leading.strip_suffix("```").unwrap_or(without_leading).trim()
}

/// Default per-endpoint timeout for code-gen calls, used by callers constructing the
/// `reqwest::Client`/rig client this adapter wraps.
pub fn code_gen_timeout() -> Duration {
    forge_core::resilience::EndpointTimeouts::code_gen()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_json_array() {
        let response = r#"[{"path": "src/lib.rs", "content": "fn main() {}", "change_type": "created", "reason": null}]"#;
        let changes = parse_file_changes(response).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "src/lib.rs");
        assert!(matches!(changes[0].change_type, ChangeType::Created));
    }

    #[test]
    fn strips_markdown_code_fences_before_parsing() {
        let response = "```json\n[{\"path\": \"a.rs\", \"content\": \"\", \"change_type\": \"modified\", \"reason\": null}]\n```";
        let changes = parse_file_changes(response).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0].change_type, ChangeType::Modified));
    }

    #[test]
    fn unknown_change_type_is_a_parse_error() {
        let response = r#"[{"path": "a.rs", "content": "", "change_type": "renamed", "reason": null}]"#;
        assert!(parse_file_changes(response).is_err());
    }

    #[test]
    fn non_json_response_is_a_parse_error() {
        assert!(parse_file_changes("I cannot do that").is_err());
    }
}
