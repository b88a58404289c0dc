use anyhow::{Context, Result};
use rig::providers::openai;
use serde::Deserialize;

/// Collaborator endpoint configuration (§6.1, §6.3, §12). Every field is overridable by an
/// `AGENT_<COMPONENT>_<KEY>` environment variable; absent variables fall back to the compiled
/// default.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub model: String,
    pub api_key: String,
}

/// Top-level agent configuration: one endpoint per Purpose/Tier pairing forge-core's
/// `IterationDeps` can be built from.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Local-tier code generation endpoint.
    pub local_endpoint: Endpoint,
    /// Cloud-tier code generation endpoint (optional; escalation to Cloud is unavailable
    /// without it).
    pub cloud_endpoint: Option<Endpoint>,
    /// Premium-tier code generation endpoint (optional).
    pub premium_endpoint: Option<Endpoint>,
    /// Thinker endpoint for the best-effort THINK phase (§4.5).
    pub thinker_endpoint: Endpoint,
    /// Validator endpoint for the VALIDATE phase.
    pub validator_endpoint: Endpoint,
    /// External memory service endpoint (optional; `MemoryClient` calls are best-effort).
    pub memory_endpoint: Option<Endpoint>,
    /// Maximum retries per iteration before the job is marked `NeedsHelp` (§4.5).
    pub max_retries: u32,
    /// Maximum retries for cloud HTTP calls. Exponential backoff: 2s, 4s, 8s, ...
    /// Populated from `AGENT_CLOUD_MAX_RETRIES` env var (default: 3).
    pub cloud_max_retries: u32,
    /// Cloud-only mode: skip local endpoint health checks, route all work through cloud.
    /// Requires `cloud_endpoint` to be configured.
    /// Populated from `--cloud-only` CLI flag or `AGENT_CLOUD_ONLY=1` env var.
    pub cloud_only: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            local_endpoint: Endpoint {
                url: std::env::var("AGENT_LOCAL_URL").unwrap_or_else(|_| "http://localhost:8000/v1".into()),
                model: std::env::var("AGENT_LOCAL_MODEL").unwrap_or_else(|_| "qwen2.5-coder-7b".into()),
                api_key: std::env::var("AGENT_LOCAL_API_KEY").unwrap_or_else(|_| "not-needed".into()),
            },
            cloud_endpoint: Self::optional_endpoint("AGENT_CLOUD_URL", "AGENT_CLOUD_MODEL", "gpt-4o-mini", "AGENT_CLOUD_API_KEY"),
            premium_endpoint: Self::optional_endpoint(
                "AGENT_PREMIUM_URL",
                "AGENT_PREMIUM_MODEL",
                "gpt-4o",
                "AGENT_PREMIUM_API_KEY",
            ),
            thinker_endpoint: Endpoint {
                url: std::env::var("AGENT_THINKER_URL").unwrap_or_else(|_| "http://localhost:8000/v1".into()),
                model: std::env::var("AGENT_THINKER_MODEL").unwrap_or_else(|_| "qwen2.5-coder-7b".into()),
                api_key: std::env::var("AGENT_THINKER_API_KEY").unwrap_or_else(|_| "not-needed".into()),
            },
            validator_endpoint: Endpoint {
                url: std::env::var("AGENT_VALIDATOR_URL").unwrap_or_else(|_| "http://localhost:8000/v1".into()),
                model: std::env::var("AGENT_VALIDATOR_MODEL").unwrap_or_else(|_| "qwen2.5-coder-7b".into()),
                api_key: std::env::var("AGENT_VALIDATOR_API_KEY").unwrap_or_else(|_| "not-needed".into()),
            },
            memory_endpoint: Self::optional_endpoint("AGENT_MEMORY_URL", "AGENT_MEMORY_MODEL", "", "AGENT_MEMORY_API_KEY"),
            max_retries: std::env::var("AGENT_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(10),
            cloud_max_retries: std::env::var("AGENT_CLOUD_MAX_RETRIES").ok().and_then(|s| s.parse().ok()).unwrap_or(3),
            cloud_only: std::env::var("AGENT_CLOUD_ONLY").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false),
        }
    }
}

impl AgentConfig {
    fn optional_endpoint(url_key: &str, model_key: &str, model_default: &str, api_key_key: &str) -> Option<Endpoint> {
        let url = std::env::var(url_key).ok()?;
        Some(Endpoint {
            url,
            model: std::env::var(model_key).unwrap_or_else(|_| model_default.to_string()),
            api_key: std::env::var(api_key_key).unwrap_or_else(|_| "not-needed".into()),
        })
    }

    /// Configuration pointing every tier at a single local proxy.
    ///
    /// Used for integration tests that run against `localhost:8317`.
    pub fn proxy_config() -> Self {
        let proxy_url = "http://localhost:8317/v1".to_string();
        let proxy_key = "forge-proxy-key".to_string();

        Self {
            local_endpoint: Endpoint { url: proxy_url.clone(), model: "local-coder".into(), api_key: proxy_key.clone() },
            cloud_endpoint: Some(Endpoint { url: proxy_url.clone(), model: "cloud-coder".into(), api_key: proxy_key.clone() }),
            premium_endpoint: Some(Endpoint { url: proxy_url.clone(), model: "premium-coder".into(), api_key: proxy_key.clone() }),
            thinker_endpoint: Endpoint { url: proxy_url.clone(), model: "thinker".into(), api_key: proxy_key.clone() },
            validator_endpoint: Endpoint { url: proxy_url, model: "validator".into(), api_key: proxy_key },
            memory_endpoint: None,
            max_retries: 3,
            cloud_max_retries: 3,
            cloud_only: false,
        }
    }
}

/// Pre-built rig `CompletionsClient`s, one per configured endpoint.
pub struct ClientSet {
    pub local: openai::CompletionsClient,
    pub cloud: Option<openai::CompletionsClient>,
    pub premium: Option<openai::CompletionsClient>,
    pub thinker: openai::CompletionsClient,
    pub validator: openai::CompletionsClient,
}

fn build_client(endpoint: &Endpoint) -> Result<openai::CompletionsClient> {
    openai::CompletionsClient::builder()
        .api_key(&endpoint.api_key)
        .base_url(&endpoint.url)
        .build()
        .with_context(|| format!("failed to build client for endpoint {}", endpoint.url))
}

impl ClientSet {
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        if config.cloud_only {
            let cloud_ep = config.cloud_endpoint.as_ref().context("cloud_only requires cloud_endpoint to be configured")?;
            return Ok(Self {
                local: build_client(cloud_ep)?,
                cloud: Some(build_client(cloud_ep)?),
                premium: None,
                thinker: build_client(cloud_ep)?,
                validator: build_client(cloud_ep)?,
            });
        }

        Ok(Self {
            local: build_client(&config.local_endpoint)?,
            cloud: config.cloud_endpoint.as_ref().map(build_client).transpose()?,
            premium: config.premium_endpoint.as_ref().map(build_client).transpose()?,
            thinker: build_client(&config.thinker_endpoint)?,
            validator: build_client(&config.validator_endpoint)?,
        })
    }
}

/// Checks if an inference endpoint is reachable and has a model loaded.
///
/// Queries `GET {url}/models` and optionally verifies that `expected_model` is in the
/// response. Returns `true` only if the endpoint responds and the model check passes.
///
/// If `api_key` is provided (and not `"not-needed"`), sends a Bearer auth header.
pub async fn check_endpoint(url: &str, api_key: Option<&str>) -> bool {
    check_endpoint_with_model(url, api_key, None).await
}

/// Like [`check_endpoint`] but also verifies a specific model is loaded.
pub async fn check_endpoint_with_model(url: &str, api_key: Option<&str>, expected_model: Option<&str>) -> bool {
    let models_url = format!("{url}/models");
    let client = reqwest::Client::new();
    let mut req = client.get(&models_url).timeout(std::time::Duration::from_secs(5));

    if let Some(key) = api_key {
        if key != "not-needed" {
            req = req.bearer_auth(key);
        }
    }

    match req.send().await {
        Ok(resp) if resp.status().is_success() => {
            let Some(expected) = expected_model else {
                return true;
            };

            if let Ok(body) = resp.json::<serde_json::Value>().await {
                let has_model = body["data"]
                    .as_array()
                    .map(|models| models.iter().any(|m| m["id"].as_str().map(|id| id.contains(expected)).unwrap_or(false)))
                    .unwrap_or(false);

                if !has_model {
                    tracing::warn!(endpoint = url, expected_model = expected, "endpoint reachable but expected model not loaded");
                }
                has_model
            } else {
                true
            }
        }
        Ok(resp) => {
            tracing::warn!(endpoint = url, status = %resp.status(), "endpoint returned non-success status");
            false
        }
        Err(e) => {
            tracing::warn!(endpoint = url, error = %e, "endpoint unreachable");
            false
        }
    }
}
