//! Reqwest-backed `MemoryClient` (§6.1): calls an optional external memory service.
//! Both operations are best-effort — a configured-but-unreachable memory service must never
//! turn into a job failure, so callers are expected to log and discard `Err` here rather than
//! propagate it.

use async_trait::async_trait;
use reqwest::Client;

use forge_core::collaborators::{CollaboratorError, MemoryClient};
use forge_core::feedback::PerformanceRecord;
use forge_core::resilience::EndpointTimeouts;

pub struct HttpMemoryClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpMemoryClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self { client: Client::new(), base_url, api_key }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{}", self.base_url.trim_end_matches('/'), path)).timeout(EndpointTimeouts::memory());
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl MemoryClient for HttpMemoryClient {
    async fn record_performance(&self, record: &PerformanceRecord) -> Result<(), CollaboratorError> {
        let response = self
            .request(reqwest::Method::POST, "/performance")
            .json(record)
            .send()
            .await
            .map_err(|e| CollaboratorError::Transient { endpoint: self.base_url.clone(), message: e.to_string() })?;
        if !response.status().is_success() {
            return Err(CollaboratorError::Transient { endpoint: self.base_url.clone(), message: format!("status {}", response.status()) });
        }
        Ok(())
    }

    async fn get_stats(&self, task_type: Option<&str>, language: Option<&str>) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        let mut request = self.request(reqwest::Method::GET, "/stats");
        if let Some(t) = task_type {
            request = request.query(&[("task_type", t)]);
        }
        if let Some(l) = language {
            request = request.query(&[("language", l)]);
        }
        let response = request.send().await.map_err(|e| CollaboratorError::Transient { endpoint: self.base_url.clone(), message: e.to_string() })?;
        if !response.status().is_success() {
            return Err(CollaboratorError::Transient { endpoint: self.base_url.clone(), message: format!("status {}", response.status()) });
        }
        response.json().await.map_err(|e| CollaboratorError::Permanent { endpoint: self.base_url.clone(), message: e.to_string() })
    }
}
