//! Agent manager: the surface the front door talks to

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::types::Message;
use tracing::{info, warn};

use crate::card::{AgentDescriptor, AgentId, normalize_base_url};
use crate::client::{A2aClient, DEFAULT_REQUEST_TIMEOUT};
use crate::discovery::{DEFAULT_DISCOVERY_TIMEOUT, DescriptorFetcher, ProbeReport, descriptor_from_value};
use crate::registry::AgentRegistry;
use crate::router::MessageRouter;

/// Outbound A2A settings
#[derive(Debug, Clone)]
pub struct A2aSettings {
    pub request_timeout: Duration,
    pub discovery_timeout: Duration,
    /// Bearer token for agents registered without their own
    pub auth_token: Option<String>,
}

impl Default for A2aSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            auth_token: None,
        }
    }
}

/// A registered agent together with its registry id
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredAgent {
    pub id: AgentId,
    #[serde(flatten)]
    pub descriptor: AgentDescriptor,
}

/// Registers agents and routes messages to them
pub struct AgentManager {
    registry: Arc<AgentRegistry>,
    fetcher: DescriptorFetcher,
    router: MessageRouter,
}

impl AgentManager {
    pub fn new(settings: A2aSettings) -> Self {
        let client = Arc::new(A2aClient::new(settings.request_timeout));
        Self::from_parts(
            Arc::new(AgentRegistry::new()),
            DescriptorFetcher::new(settings.discovery_timeout),
            MessageRouter::new(client).with_default_token(settings.auth_token),
        )
    }

    pub fn from_parts(
        registry: Arc<AgentRegistry>,
        fetcher: DescriptorFetcher,
        router: MessageRouter,
    ) -> Self {
        Self {
            registry,
            fetcher,
            router,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Fetch an agent's descriptor and register it. `None` if the agent
    /// could not be resolved; the reason is logged.
    pub async fn register_agent_from_url(&self, url: &str) -> Option<AgentDescriptor> {
        self.register_agent_from_url_with_token(url, None).await
    }

    pub async fn register_agent_from_url_with_token(
        &self,
        url: &str,
        auth_token: Option<String>,
    ) -> Option<AgentDescriptor> {
        let descriptor = match self.fetcher.fetch(url).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Failed to register agent from {}: {}", url, e);
                return None;
            }
        };
        match self
            .registry
            .register_with_token(descriptor.clone(), auth_token)
            .await
        {
            Ok(_) => Some(descriptor),
            Err(e) => {
                warn!("Failed to register agent from {}: {}", url, e);
                None
            }
        }
    }

    /// Register an agent from a descriptor document. Both `url` and `name`
    /// are required.
    pub async fn register_agent_from_json(&self, json: Value) -> Option<AgentDescriptor> {
        let Some(url) = json.get("url").and_then(Value::as_str).map(normalize_base_url) else {
            warn!("Missing 'url' field in agent JSON data");
            return None;
        };
        let descriptor = match descriptor_from_value(json, &url) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!("Rejected agent JSON for {}: {}", url, e);
                return None;
            }
        };
        match self.registry.register(descriptor.clone()).await {
            Ok(_) => Some(descriptor),
            Err(e) => {
                warn!("Rejected agent JSON for {}: {}", url, e);
                None
            }
        }
    }

    /// All registered descriptors, in no particular order
    pub async fn list_agents(&self) -> Vec<AgentDescriptor> {
        self.registry.list().await
    }

    /// All registered agents with their ids, sorted by name
    pub async fn agents(&self) -> Vec<RegisteredAgent> {
        let mut agents: Vec<RegisteredAgent> = self
            .registry
            .entries()
            .await
            .into_iter()
            .map(|(id, descriptor)| RegisteredAgent { id, descriptor })
            .collect();
        agents.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        agents
    }

    /// Route a message to an agent; see [`MessageRouter::route`]
    pub async fn route(&self, message: &Message) -> Message {
        self.router.route(message, &self.registry).await
    }

    /// Run discovery against `url` without registering anything
    pub async fn diagnose(&self, url: &str) -> ProbeReport {
        info!("Testing agent connection to {}", url);
        self.fetcher.diagnose(url).await
    }
}

impl Default for AgentManager {
    fn default() -> Self {
        Self::new(A2aSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_from_json() {
        let manager = AgentManager::default();
        let card = manager
            .register_agent_from_json(json!({"name": "Echo", "url": "localhost:9000/"}))
            .await
            .unwrap();
        assert_eq!(card.url, "http://localhost:9000");
        assert_eq!(card.id(), AgentId::from_url("http://localhost:9000"));
        assert_eq!(manager.list_agents().await.len(), 1);
        assert!(manager.registry().get(&card.id()).await.is_some());
    }

    #[tokio::test]
    async fn test_json_and_url_registration_share_an_entry() {
        let manager = AgentManager::default();
        manager
            .register_agent_from_json(json!({"name": "Old", "url": "localhost:9000/"}))
            .await
            .unwrap();
        manager
            .register_agent_from_json(json!({"name": "New", "url": "http://localhost:9000"}))
            .await
            .unwrap();
        let agents = manager.list_agents().await;
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "New");
        assert_eq!(agents[0].url, "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_register_from_json_requires_url_and_name() {
        let manager = AgentManager::default();
        assert!(manager.register_agent_from_json(json!({"name": "Echo"})).await.is_none());
        assert!(manager.register_agent_from_json(json!({"url": "http://x"})).await.is_none());
        assert!(manager.list_agents().await.is_empty());
    }

    #[tokio::test]
    async fn test_agents_include_ids() {
        let manager = AgentManager::default();
        manager
            .register_agent_from_json(json!({"name": "B", "url": "http://b"}))
            .await;
        manager
            .register_agent_from_json(json!({"name": "A", "url": "http://a"}))
            .await;
        let agents = manager.agents().await;
        assert_eq!(agents[0].descriptor.name, "A");
        assert_eq!(agents[0].id, AgentId::from_url("http://a"));

        let json = serde_json::to_value(&agents[0]).unwrap();
        assert_eq!(json["id"], agents[0].id.as_str());
        assert_eq!(json["name"], "A");
    }
}
