//! Rig-backed `ThinkerClient` (§6.1): one-shot prompt returning raw guidance text.
//!
//! Grounded on `validator.rs`'s thin client-struct shape; failure here is non-fatal at the
//! call site (§4.5 step 1), so this client surfaces a typed error but never panics or retries
//! indefinitely.

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

use forge_core::collaborators::{CollaboratorError, ThinkHistoryEntry, ThinkerClient};
use forge_core::resilience::{call_with_resilience, CircuitBreaker, RetryPolicy};

use super::classify_transport_error;

const PREAMBLE: &str = "You are a planning assistant for a code generation loop. Given the \
    task, context, iteration history, and a summary of files produced so far, give brief, \
    actionable guidance for the next attempt. Respond in plain text, a few sentences.";

pub struct RigThinkerClient {
    client: openai::CompletionsClient,
    model: String,
    endpoint: String,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl RigThinkerClient {
    pub fn new(client: openai::CompletionsClient, model: String, endpoint: String, breaker: Arc<CircuitBreaker>, retry: RetryPolicy) -> Self {
        Self { client, model, endpoint, breaker, retry }
    }
}

#[async_trait]
impl ThinkerClient for RigThinkerClient {
    async fn think(&self, task: &str, context: &str, history: &[ThinkHistoryEntry], file_summary: &str) -> Result<String, CollaboratorError> {
        let history_text = history.iter().map(|h| format!("iteration {}: {}", h.iteration, h.summary)).collect::<Vec<_>>().join("\n");
        let prompt = format!("Task: {task}\nContext: {context}\nHistory:\n{history_text}\nFiles so far:\n{file_summary}");

        let agent = self.client.agent(&self.model).preamble(PREAMBLE).build();
        call_with_resilience(
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
        .map_err(|message| CollaboratorError::Transient { endpoint: self.endpoint.clone(), message })
    }
}
