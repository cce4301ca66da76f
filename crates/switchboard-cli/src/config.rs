use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use switchboard_a2a::A2aSettings;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchboardConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub a2a: A2aConfig,
}

// ── Gateway Config ──────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub auth_token: String,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("auth_token", &mask_secret(&self.auth_token))
            .finish()
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    5000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            auth_token: String::new(),
        }
    }
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("Invalid gateway address {}:{}", self.bind, self.port))
    }

    /// Base url for talking to a running gateway
    pub fn base_url(&self) -> String {
        let host = if self.bind == "0.0.0.0" { "127.0.0.1" } else { &self.bind };
        format!("http://{}:{}", host, self.port)
    }
}

// ── A2A Config ──────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct A2aConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
    /// Default outbound token for agents registered without one
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub agents: Vec<A2aAgentEntry>,
}

impl std::fmt::Debug for A2aConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A2aConfig")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("discovery_timeout_secs", &self.discovery_timeout_secs)
            .field("auth_token", &mask_secret(&self.auth_token))
            .field("agents", &self.agents)
            .finish()
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_discovery_timeout() -> u64 {
    15
}

impl Default for A2aConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            discovery_timeout_secs: default_discovery_timeout(),
            auth_token: String::new(),
            agents: vec![],
        }
    }
}

impl A2aConfig {
    pub fn settings(&self) -> A2aSettings {
        A2aSettings {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            discovery_timeout: Duration::from_secs(self.discovery_timeout_secs),
            auth_token: non_empty(&self.auth_token),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct A2aAgentEntry {
    pub url: String,
    #[serde(default)]
    pub token: String,
}

impl std::fmt::Debug for A2aAgentEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A2aAgentEntry")
            .field("url", &self.url)
            .field("token", &mask_secret(&self.token))
            .finish()
    }
}

impl A2aAgentEntry {
    pub fn token(&self) -> Option<String> {
        non_empty(&self.token)
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Mask a secret for Debug output and logs: first 3 and last 4 chars of
/// anything longer than 7 chars, otherwise "***"
pub fn mask_secret(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    match chars.len() {
        0 => "(empty)".to_string(),
        n if n > 7 => format!(
            "{}...{}",
            chars[..3].iter().collect::<String>(),
            chars[n - 4..].iter().collect::<String>()
        ),
        _ => "***".to_string(),
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl SwitchboardConfig {
    /// Load from `custom_path` or `~/.switchboard/config.toml`. A missing
    /// default file yields the built-in defaults.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path.clone().unwrap_or_else(default_config_path);
        if custom_path.is_none() && !path.exists() {
            warn!(
                "No config at {}, using defaults. Run `switchboard init` to create one.",
                path.display()
            );
            return Ok(Self::default());
        }

        check_permissions(&path)?;

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        // Tokens written literally rather than as ${VAR} references
        if let Ok(raw) = toml::from_str::<Self>(&content) {
            for (label, token) in raw.tokens() {
                if !token.is_empty() && !token.contains("${") {
                    warn!(
                        "{} is hardcoded in config file. For security, use an environment variable reference instead",
                        label
                    );
                }
            }
        }
        Ok(config)
    }

    /// Parse config text, expanding allowlisted `${VAR}` references first
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(&expand_env_vars(content))?)
    }

    fn tokens(&self) -> Vec<(&'static str, &str)> {
        let mut tokens = vec![
            ("gateway.auth_token", self.gateway.auth_token.as_str()),
            ("a2a.auth_token", self.a2a.auth_token.as_str()),
        ];
        tokens.extend(self.a2a.agents.iter().map(|a| ("a2a.agents.token", a.token.as_str())));
        tokens
    }

    /// Copy with every secret masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.gateway.auth_token = mask_secret(&copy.gateway.auth_token);
        copy.a2a.auth_token = mask_secret(&copy.a2a.auth_token);
        for agent in &mut copy.a2a.agents {
            agent.token = mask_secret(&agent.token);
        }
        copy
    }
}

/// Refuse a config file that group or other can read (Unix only)
fn check_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                anyhow::bail!(
                    "Config file {} has overly permissive permissions ({:o}). \
                     It may contain secrets. Fix with: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Environment variables that may be referenced from the config file
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "SWITCHBOARD_GATEWAY_TOKEN",
    "A2A_AUTH_TOKEN",
    "SWITCHBOARD_AGENT_TOKEN",
    "HOME",
    "USER",
];

/// Replace `${VAR}` with its value for allowlisted names. Other references
/// are left in place; unset variables expand to "".
fn expand_env_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 2..start + len];
        out.push_str(&rest[..start]);
        if ALLOWED_ENV_VARS.contains(&name) {
            out.push_str(&std::env::var(name).unwrap_or_default());
        } else {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                name
            );
            out.push_str(&rest[start..=start + len]);
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}
