use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchboard_a2a::{A2aClient, AgentManager};
use switchboard_core::types::{Message, Role, meta};
use switchboard_gateway::{GatewayServer, GatewayState};

mod config;

use config::SwitchboardConfig;

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version)]
#[command(about = "switchboard: a chat hub that routes conversations to A2A agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway daemon
    Start,

    /// Write a default config to ~/.switchboard/config.toml
    Init,

    /// Show current configuration (secrets masked)
    Config,

    /// Register an agent with a running gateway
    Register {
        /// Agent base url or descriptor url
        url: String,
        /// Gateway url (defaults to the configured address)
        #[arg(long)]
        gateway: Option<String>,
    },

    /// Diagnose discovery of an agent without registering it
    Probe {
        url: String,
    },

    /// Send a one-shot message to an agent
    Ask {
        /// The message to send
        message: String,
        /// Agent url; defaults to the agents in the config
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Look up a task on an agent
    Task {
        /// Agent url
        url: String,
        task_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start => cmd_start(&cli.config).await,
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Register { url, gateway } => cmd_register(&cli.config, &url, gateway).await,
        Commands::Probe { url } => cmd_probe(&cli.config, &url).await,
        Commands::Ask { message, agent } => cmd_ask(&cli.config, &message, agent).await,
        Commands::Task { url, task_id } => cmd_task(&cli.config, &url, &task_id).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config::default_config_path();
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("switchboard initialized at {}", config_dir.display());
    println!("Edit {} to add agents and tokens.", config_path.display());
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    println!("# ${{VAR}} expansion allowed for: {}", config::ALLOWED_ENV_VARS.join(", "));
    Ok(())
}

/// Build the agent manager and register every configured agent
async fn agents_from_config(cfg: &SwitchboardConfig) -> Arc<AgentManager> {
    let manager = Arc::new(AgentManager::new(cfg.a2a.settings()));

    let mut join_set = JoinSet::new();
    for entry in cfg.a2a.agents.clone() {
        let manager = manager.clone();
        join_set.spawn(async move {
            let registered = manager
                .register_agent_from_url_with_token(&entry.url, entry.token())
                .await;
            (entry.url, registered)
        });
    }
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((_, Some(agent))) => info!("Registered agent '{}' ({})", agent.name, agent.url),
            Ok((url, None)) => warn!("Agent at {} could not be registered", url),
            Err(e) => warn!("Agent registration task failed: {}", e),
        }
    }
    manager
}

async fn cmd_start(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    info!("Starting switchboard gateway...");

    let agents = agents_from_config(&cfg).await;
    info!("{} agent(s) registered", agents.registry().len().await);

    let bind = cfg.gateway.socket_addr()?;
    let state = GatewayState::new(agents, cfg.gateway.auth_token.clone());
    let server = GatewayServer::new(bind, state);
    let shutdown = server.shutdown_token();
    let mut server_task = server.spawn();

    println!("switchboard is running on http://{}. Press Ctrl+C to stop.", bind);

    tokio::select! {
        result = &mut server_task => {
            // The server only returns on its own if it failed to start
            return result.context("Gateway task panicked")?;
        }
        interrupted = signal::ctrl_c() => {
            interrupted?;
            info!("Received Ctrl+C, shutting down...");
        }
    }

    shutdown.cancel();
    match tokio::time::timeout(Duration::from_secs(10), server_task).await {
        Ok(result) => result.context("Gateway task panicked")??,
        Err(_) => warn!("Gateway did not stop within 10s"),
    }

    println!("switchboard stopped.");
    Ok(())
}

async fn cmd_register(
    config_path: &Option<PathBuf>,
    url: &str,
    gateway: Option<String>,
) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    let gateway = gateway.unwrap_or_else(|| cfg.gateway.base_url());
    let endpoint = format!("{}/api/agents/register-from-url", gateway.trim_end_matches('/'));

    let mut request = reqwest::Client::new()
        .post(&endpoint)
        .json(&json!({ "url": url }));
    if !cfg.gateway.auth_token.is_empty() {
        request = request.bearer_auth(&cfg.gateway.auth_token);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("Could not reach gateway at {}. Is `switchboard start` running?", gateway))?;

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("registration failed");
        bail!("Gateway refused registration (HTTP {}): {}", status.as_u16(), message);
    }

    println!("{}", body["message"].as_str().unwrap_or("Agent registered"));
    println!("{}", serde_json::to_string_pretty(&body["agent"])?);
    Ok(())
}

async fn cmd_probe(config_path: &Option<PathBuf>, url: &str) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    let manager = AgentManager::new(cfg.a2a.settings());
    let report = manager.diagnose(url).await;

    for step in &report.steps {
        println!("[{:?}] {}: {}", step.status, step.step, step.message);
    }
    match &report.agent_data {
        Some(agent) => {
            println!();
            println!("{}", serde_json::to_string_pretty(agent)?);
            Ok(())
        }
        None => bail!(
            "{}",
            report.error.as_deref().unwrap_or("No valid agent found")
        ),
    }
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    message: &str,
    agent: Option<String>,
) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;

    let manager = match &agent {
        Some(url) => {
            let manager = Arc::new(AgentManager::new(cfg.a2a.settings()));
            manager
                .register_agent_from_url(url)
                .await
                .with_context(|| format!("Could not resolve an agent at {}", url))?;
            manager
        }
        None => agents_from_config(&cfg).await,
    };

    let conversation_id = uuid::Uuid::new_v4().to_string();
    let reply = manager.route(&Message::user(conversation_id, message)).await;

    let text = reply.text();
    if !text.is_empty() {
        println!("{}", text);
    }
    if let Some(raw) = &reply.raw {
        println!("{}", serde_json::to_string_pretty(raw)?);
    }
    if let Some(agent_id) = reply.metadata_str(meta::AGENT_ID) {
        info!("Answered by {}", agent_id);
    }
    if reply.role == Role::System {
        bail!("No agent reply");
    }
    Ok(())
}

async fn cmd_task(config_path: &Option<PathBuf>, url: &str, task_id: &str) -> Result<()> {
    let cfg = SwitchboardConfig::load(config_path)?;
    let settings = cfg.a2a.settings();
    let client = A2aClient::new(settings.request_timeout);
    let token = cfg
        .a2a
        .agents
        .iter()
        .find(|a| a.url.trim_end_matches('/') == url.trim_end_matches('/'))
        .and_then(|a| a.token())
        .or(settings.auth_token);

    let response = client.get_task(url, task_id, token.as_deref()).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
