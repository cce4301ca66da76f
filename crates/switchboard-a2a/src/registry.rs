//! Agent registry: registered descriptors keyed by [`AgentId`]
//!
//! Iteration order is unspecified: `list`, `entries` and `snapshot` return
//! agents in hash-map order, not registration order.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::card::{AgentDescriptor, AgentId};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("agent descriptor is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    descriptor: AgentDescriptor,
    auth_token: Option<String>,
}

/// Shared registry of known agents
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentId, RegistryEntry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or re-register) an agent. The same url always yields the
    /// same id, and re-registering overwrites the stored descriptor.
    /// Descriptors without a name or url are refused.
    pub async fn register(&self, descriptor: AgentDescriptor) -> Result<AgentId, RegistryError> {
        self.register_with_token(descriptor, None).await
    }

    /// Register an agent together with the bearer token used when calling
    /// it. A `None` token keeps whatever token was stored before.
    pub async fn register_with_token(
        &self,
        descriptor: AgentDescriptor,
        auth_token: Option<String>,
    ) -> Result<AgentId, RegistryError> {
        let descriptor = descriptor.normalized();
        let missing = descriptor.missing_fields();
        if !missing.is_empty() {
            return Err(RegistryError::MissingFields(missing));
        }
        let id = descriptor.id();
        let mut agents = self.agents.write().await;
        let auth_token = auth_token
            .filter(|t| !t.is_empty())
            .or_else(|| agents.get(&id).and_then(|e| e.auth_token.clone()));
        info!("Registered agent: {} at {} ({})", descriptor.name, descriptor.url, id);
        agents.insert(
            id.clone(),
            RegistryEntry {
                descriptor,
                auth_token,
            },
        );
        Ok(id)
    }

    pub async fn get(&self, id: &AgentId) -> Option<AgentDescriptor> {
        self.agents.read().await.get(id).map(|e| e.descriptor.clone())
    }

    /// All descriptors, in no particular order
    pub async fn list(&self) -> Vec<AgentDescriptor> {
        self.agents
            .read()
            .await
            .values()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// All (id, descriptor) pairs, in no particular order
    pub async fn entries(&self) -> Vec<(AgentId, AgentDescriptor)> {
        self.agents
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.descriptor.clone()))
            .collect()
    }

    /// Point-in-time copy for agent selection
    pub async fn snapshot(&self) -> HashMap<AgentId, AgentDescriptor> {
        self.agents
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.descriptor.clone()))
            .collect()
    }

    pub async fn auth_token(&self, id: &AgentId) -> Option<String> {
        self.agents
            .read()
            .await
            .get(id)
            .and_then(|e| e.auth_token.clone())
    }

    pub async fn unregister(&self, id: &AgentId) -> Option<AgentDescriptor> {
        let removed = self.agents.write().await.remove(id).map(|e| e.descriptor);
        if let Some(descriptor) = &removed {
            info!("Unregistered agent: {} ({})", descriptor.name, id);
        }
        removed
    }

    pub async fn clear(&self) {
        self.agents.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = AgentRegistry::new();
        let id = registry
            .register(AgentDescriptor::new("Echo", "http://localhost:9000"))
            .await
            .unwrap();
        assert_eq!(id, AgentId::from_url("http://localhost:9000"));
        assert_eq!(registry.get(&id).await.unwrap().name, "Echo");
        assert!(registry.get(&AgentId::from("agent-missing")).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_incomplete_descriptor_is_refused() {
        let registry = AgentRegistry::new();
        let err = registry.register(AgentDescriptor::new("", "")).await.unwrap_err();
        let RegistryError::MissingFields(missing) = err;
        assert_eq!(missing, vec!["name", "url"]);

        assert!(registry.register(AgentDescriptor::new("NoUrl", "  ")).await.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_reregistration_overwrites() {
        let registry = AgentRegistry::new();
        let first = registry
            .register(AgentDescriptor::new("Old", "http://localhost:9000"))
            .await
            .unwrap();
        let second = registry
            .register(AgentDescriptor::new("New", "http://localhost:9000"))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get(&first).await.unwrap().name, "New");
    }

    #[tokio::test]
    async fn test_token_survives_reregistration_without_token() {
        let registry = AgentRegistry::new();
        let id = registry
            .register_with_token(AgentDescriptor::new("A", "http://a"), Some("secret".into()))
            .await
            .unwrap();
        registry.register(AgentDescriptor::new("A2", "http://a")).await.unwrap();
        assert_eq!(registry.auth_token(&id).await.as_deref(), Some("secret"));

        registry
            .register_with_token(AgentDescriptor::new("A3", "http://a"), Some("rotated".into()))
            .await
            .unwrap();
        assert_eq!(registry.auth_token(&id).await.as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn test_unregister_and_clear() {
        let registry = AgentRegistry::new();
        let a = registry.register(AgentDescriptor::new("A", "http://a")).await.unwrap();
        registry.register(AgentDescriptor::new("B", "http://b")).await.unwrap();

        assert_eq!(registry.unregister(&a).await.unwrap().name, "A");
        assert!(registry.unregister(&a).await.is_none());
        assert_eq!(registry.list().await.len(), 1);

        registry.clear().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_matches_entries() {
        let registry = AgentRegistry::new();
        registry.register(AgentDescriptor::new("A", "http://a")).await.unwrap();
        registry.register(AgentDescriptor::new("B", "http://b")).await.unwrap();
        let snapshot = registry.snapshot().await;
        let entries = registry.entries().await;
        assert_eq!(snapshot.len(), 2);
        for (id, descriptor) in entries {
            assert_eq!(snapshot.get(&id), Some(&descriptor));
        }
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let registry = std::sync::Arc::new(AgentRegistry::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .register(AgentDescriptor::new(format!("agent-{}", i), format!("http://a{}", i)))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(registry.len().await, 16);
    }
}
