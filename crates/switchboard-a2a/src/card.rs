//! Agent descriptors ("agent cards") and the ids the registry keys them by

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_modes() -> Vec<String> {
    vec!["text/plain".to_string()]
}

/// A skill advertised by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default, alias = "file_upload")]
    pub file_upload: bool,
    #[serde(default, alias = "image_output")]
    pub image_output: bool,
}

/// Capability descriptor of a remote agent, as served at
/// `/.well-known/agent.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_modes")]
    pub default_input_modes: Vec<String>,
    #[serde(default = "default_modes")]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

impl AgentDescriptor {
    /// Minimal descriptor with defaults for everything but name and url
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            url: url.into(),
            version: default_version(),
            default_input_modes: default_modes(),
            default_output_modes: default_modes(),
            capabilities: AgentCapabilities::default(),
            skills: Vec::new(),
        }
    }

    /// Names of required fields that are empty
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name".to_string());
        }
        if self.url.trim().is_empty() {
            missing.push("url".to_string());
        }
        missing
    }

    /// Normalize the url with [`normalize_base_url`]. An empty url stays
    /// empty so [`missing_fields`](Self::missing_fields) still reports it.
    pub fn normalized(mut self) -> Self {
        let url = self.url.trim();
        self.url = if url.is_empty() {
            String::new()
        } else {
            normalize_base_url(url)
        };
        self
    }

    pub fn id(&self) -> AgentId {
        AgentId::from_url(&self.url)
    }
}

/// Registry key for an agent, derived from its url.
///
/// The id is a SHA-256 digest of the canonicalized url, so it is stable
/// across calls and distinct urls do not collide in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn from_url(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_url(url).as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("agent-{}", &digest[..32]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form used for hashing: parsed and re-serialized when the url
/// is valid (lowercases scheme and host, drops default ports), trailing
/// slashes removed either way.
fn canonical_url(url: &str) -> String {
    let trimmed = url.trim();
    let canonical = match url::Url::parse(trimmed) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => trimmed.to_string(),
    };
    canonical.trim_end_matches('/').to_string()
}

/// Whether a url already carries an http(s) scheme
pub fn has_http_scheme(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Prefix `http://` when no scheme is given and strip trailing slashes
pub fn normalize_base_url(input: &str) -> String {
    let trimmed = input.trim();
    let with_scheme = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    with_scheme.trim_end_matches('/').to_string()
}
