//! A2A client: one JSON-RPC POST per call, no retries

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::protocol::{RequestEnvelope, build_get_request, truncate};

/// Default timeout for a task request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response excerpt kept in an error
const MAX_ERROR_DETAIL: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("Failed to parse JSON response: {0}")]
    JsonDecode(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Request failed: {0}")]
    Network(String),
}

/// Sends a task envelope to an agent and returns the decoded JSON body.
///
/// The router talks to agents only through this trait.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        envelope: &RequestEnvelope,
        auth_token: Option<&str>,
    ) -> Result<Value, ClientError>;
}

/// reqwest-backed A2A client
#[derive(Debug, Clone)]
pub struct A2aClient {
    client: Client,
    timeout: Duration,
}

impl A2aClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// Poll the state of a task with `tasks/get`
    pub async fn get_task(
        &self,
        url: &str,
        task_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Value, ClientError> {
        self.post(url, &build_get_request(task_id), auth_token).await
    }

    async fn post(
        &self,
        url: &str,
        envelope: &RequestEnvelope,
        auth_token: Option<&str>,
    ) -> Result<Value, ClientError> {
        debug!("Sending {} ({}) to {}", envelope.method, envelope.id, url);

        let mut request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header("content-type", "application/json")
            .json(envelope);
        if let Some(token) = auth_token.filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify_reqwest_error(e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.classify_reqwest_error(e))?;
        debug!("Received HTTP {} from {} ({} bytes)", status, url, body.len());

        if !status.is_success() {
            warn!("Agent at {} answered HTTP {}", url, status);
            return Err(ClientError::Http {
                status: status.as_u16(),
                detail: error_detail(status, &body),
            });
        }

        decode_body(&body)
    }

    fn classify_reqwest_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout.as_secs())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl Default for A2aClient {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl AgentTransport for A2aClient {
    async fn send(
        &self,
        url: &str,
        envelope: &RequestEnvelope,
        auth_token: Option<&str>,
    ) -> Result<Value, ClientError> {
        self.post(url, envelope, auth_token).await
    }
}

/// Decode a 2xx response body
pub fn decode_body(body: &str) -> Result<Value, ClientError> {
    serde_json::from_str(body).map_err(|e| ClientError::JsonDecode(e.to_string()))
}

/// Human-readable detail for a non-2xx response: the JSON body re-serialized
/// compactly when it parses, otherwise the raw text
fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Unknown status");
    let body = match serde_json::from_str::<Value>(body) {
        Ok(json) => json.to_string(),
        Err(_) => body.trim().to_string(),
    };
    if body.is_empty() {
        reason.to_string()
    } else {
        format!("{}. Response: {}", reason, truncate(&body, MAX_ERROR_DETAIL))
    }
}
