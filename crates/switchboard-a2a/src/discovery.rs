//! Agent discovery: resolve and validate an agent's descriptor from a url
//!
//! Probe order for a base url:
//! 1. `{url}/.well-known/agent.json`
//! 2. `{url}`
//!
//! A url that already ends in `agent.json` is fetched directly. Only an
//! unreachable candidate or a non-2xx status moves on to the next one; a 2xx
//! answer decides the outcome.

use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::card::{AgentDescriptor, has_http_scheme, normalize_base_url};
use crate::protocol::truncate;

pub const AGENT_CARD_PATH: &str = "/.well-known/agent.json";
const AGENT_CARD_FILE: &str = "agent.json";

/// Default timeout for a single descriptor probe
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("timed out fetching {url} after {secs}s")]
    Timeout { url: String, secs: u64 },
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("network error fetching {url}: {detail}")]
    Network { url: String, detail: String },
    #[error("response from {url} is not valid JSON: {detail}")]
    InvalidJson { url: String, detail: String },
    #[error("descriptor is missing required fields: {}", .0.join(", "))]
    InvalidDescriptor(Vec<String>),
    #[error("descriptor is malformed: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether the candidate answered 2xx, which ends the probe
    fn reached_server(&self) -> bool {
        matches!(
            self,
            Self::InvalidJson { .. } | Self::InvalidDescriptor(_) | Self::Malformed(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Valid,
    Modified,
    Info,
    Success,
    Failed,
}

/// One step of a discovery run
#[derive(Debug, Clone, Serialize)]
pub struct ProbeStep {
    pub step: String,
    pub status: StepStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Step-by-step account of a discovery run, for connection diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub steps: Vec<ProbeStep>,
    pub success: bool,
    pub error: Option<String>,
    pub agent_data: Option<AgentDescriptor>,
}

impl ProbeReport {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            steps: Vec::new(),
            success: false,
            error: None,
            agent_data: None,
        }
    }

    fn push(&mut self, step: impl Into<String>, status: StepStatus, message: impl Into<String>) {
        self.steps.push(ProbeStep {
            step: step.into(),
            status,
            message: message.into(),
            details: None,
        });
    }
}

/// Fetches agent descriptors over HTTP
#[derive(Debug, Clone)]
pub struct DescriptorFetcher {
    client: Client,
    timeout: Duration,
}

impl DescriptorFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// Resolve the descriptor for `url`
    pub async fn fetch(&self, url: &str) -> Result<AgentDescriptor, FetchError> {
        self.run(url).await.0
    }

    /// Run discovery and report every step taken
    pub async fn diagnose(&self, url: &str) -> ProbeReport {
        self.run(url).await.1
    }

    async fn run(&self, input: &str) -> (Result<AgentDescriptor, FetchError>, ProbeReport) {
        let mut report = ProbeReport::new(input);

        let trimmed = input.trim();
        if has_http_scheme(trimmed) {
            report.push("URL Formatting", StepStatus::Valid, "URL has valid protocol prefix");
        } else {
            report.push(
                "URL Formatting",
                StepStatus::Modified,
                format!("Added http:// prefix: http://{}", trimmed),
            );
        }

        let base = normalize_base_url(trimmed);
        if trimmed.ends_with('/') {
            report.push(
                "URL Cleaning",
                StepStatus::Modified,
                format!("Removed trailing slashes: {}", base),
            );
        } else {
            report.push("URL Cleaning", StepStatus::Valid, "URL had no trailing slashes");
        }

        let candidates = candidate_urls(&base);
        let agent_url = agent_base_url(&base);
        report.push(
            "URL Resolution",
            StepStatus::Info,
            format!("Will try {} URL variations", candidates.len()),
        );

        let mut last_error = None;
        for (url, description) in &candidates {
            match self.try_candidate(url, description, &agent_url, &mut report).await {
                Ok(descriptor) => {
                    info!("Resolved agent '{}' from {}", descriptor.name, url);
                    report.success = true;
                    report.agent_data = Some(descriptor.clone());
                    return (Ok(descriptor), report);
                }
                Err(e) => {
                    warn!("Descriptor probe failed ({}): {}", description, e);
                    let stop = e.reached_server();
                    last_error = Some(e);
                    if stop {
                        break;
                    }
                }
            }
        }

        let error = last_error.unwrap_or(FetchError::InvalidDescriptor(vec!["name".into()]));
        report.error = Some(format!(
            "Could not find a valid agent at any of the tried URLs: {}",
            error
        ));
        (Err(error), report)
    }

    async fn try_candidate(
        &self,
        url: &str,
        description: &str,
        agent_url: &str,
        report: &mut ProbeReport,
    ) -> Result<AgentDescriptor, FetchError> {
        let attempt = format!("Connection Attempt ({})", description);
        debug!("Fetching agent descriptor from {}", url);

        let response = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                let err = self.classify(url, e);
                report.push(attempt, StepStatus::Failed, err.to_string());
                return Err(err);
            }
        };

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("");
        report.steps.push(ProbeStep {
            step: attempt,
            status: if status.is_success() {
                StepStatus::Success
            } else {
                StepStatus::Failed
            },
            message: format!("HTTP {} {}", status.as_u16(), reason),
            details: Some(json!({
                "url": url,
                "status_code": status.as_u16(),
                "reason": reason,
            })),
        });
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| self.classify(url, e))?;
        let value: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) => {
                report.push("JSON Parsing", StepStatus::Failed, "Response is not valid JSON");
                return Err(FetchError::InvalidJson {
                    url: url.to_string(),
                    detail: format!("{} (body: {})", e, truncate(body.trim(), 120)),
                });
            }
        };

        let had_url = value.get("url").is_some_and(|u| !u.is_null());
        match descriptor_from_value(value, agent_url) {
            Ok(descriptor) => {
                report.push(
                    "Agent Validation",
                    StepStatus::Success,
                    format!("Found valid agent: {}", descriptor.name),
                );
                if !had_url {
                    report.push(
                        "URL Field",
                        StepStatus::Modified,
                        format!("Added missing URL field: {}", agent_url),
                    );
                }
                Ok(descriptor)
            }
            Err(e) => {
                report.push("Agent Validation", StepStatus::Failed, e.to_string());
                Err(e)
            }
        }
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                detail: err.to_string(),
            }
        }
    }
}

impl Default for DescriptorFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_TIMEOUT)
    }
}

/// Urls to probe for a normalized base url, with a label for each
pub fn candidate_urls(base: &str) -> Vec<(String, &'static str)> {
    if base.ends_with(AGENT_CARD_FILE) {
        vec![(base.to_string(), "Direct agent.json URL")]
    } else {
        vec![
            (format!("{}{}", base, AGENT_CARD_PATH), "Well-known path"),
            (base.to_string(), "Base URL"),
        ]
    }
}

/// The agent's own url for a normalized input: a direct descriptor url
/// loses its `/.well-known/agent.json` (or `/agent.json`) suffix.
pub fn agent_base_url(base: &str) -> String {
    let stripped = base
        .strip_suffix(AGENT_CARD_PATH)
        .or_else(|| base.strip_suffix(AGENT_CARD_FILE).and_then(|b| b.strip_suffix('/')));
    match stripped {
        Some(rest) if rest.split_once("://").is_some_and(|(_, host)| !host.is_empty()) => {
            rest.trim_end_matches('/').to_string()
        }
        _ => base.to_string(),
    }
}

/// Validate a descriptor document and fill in what may be omitted.
///
/// `name` must be a non-empty string. A missing `url` is set to
/// `base_url` (the probed base, never the descriptor path).
pub fn descriptor_from_value(value: Value, base_url: &str) -> Result<AgentDescriptor, FetchError> {
    let Value::Object(mut obj) = value else {
        return Err(FetchError::InvalidDescriptor(vec!["name".into()]));
    };

    let has_name = obj
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.trim().is_empty());
    if !has_name {
        return Err(FetchError::InvalidDescriptor(vec!["name".into()]));
    }

    if obj.get("url").is_none_or(Value::is_null) {
        debug!("Descriptor has no url, using {}", base_url);
        obj.insert("url".into(), Value::String(base_url.to_string()));
    }

    let descriptor: AgentDescriptor = serde_json::from_value(Value::Object(obj))
        .map_err(|e| FetchError::Malformed(e.to_string()))?;
    let descriptor = descriptor.normalized();

    let missing = descriptor.missing_fields();
    if !missing.is_empty() {
        return Err(FetchError::InvalidDescriptor(missing));
    }
    Ok(descriptor)
}
