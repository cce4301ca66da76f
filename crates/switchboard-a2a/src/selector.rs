//! Agent selection for an inbound message
//!
//! Priority:
//! 1. the agent named by the message's `agent_id` metadata
//! 2. a routing agent ("host" in the name, or a skill id containing "routing")
//! 3. any registered agent
//!
//! Steps 2 and 3 scan in registry iteration order, which is unspecified.

use std::collections::HashMap;
use switchboard_core::types::{Message, meta};
use tracing::{debug, info, warn};

use crate::card::{AgentDescriptor, AgentId};

/// Pick the agent that should handle `message`. Pure function of its inputs.
pub fn select_agent(
    message: &Message,
    agents: &HashMap<AgentId, AgentDescriptor>,
) -> Option<(AgentId, AgentDescriptor)> {
    if let Some(requested) = message.metadata_str(meta::AGENT_ID) {
        if let Some(found) = resolve_reference(requested, agents) {
            info!("Selected agent {} from message metadata", found.1.name);
            return Some(found);
        }
        warn!("Requested agent '{}' is not registered, falling back", requested);
    }

    if let Some((id, agent)) = agents.iter().find(|(_, agent)| is_routing_agent(agent)) {
        info!("Using host agent: {}", agent.name);
        return Some((id.clone(), agent.clone()));
    }

    match agents.iter().next() {
        Some((id, agent)) => {
            info!("Using default agent: {}", agent.name);
            Some((id.clone(), agent.clone()))
        }
        None => {
            debug!("No agents available");
            None
        }
    }
}

/// A reference is either a registry id or the agent's url
fn resolve_reference(
    reference: &str,
    agents: &HashMap<AgentId, AgentDescriptor>,
) -> Option<(AgentId, AgentDescriptor)> {
    [AgentId::from(reference), AgentId::from_url(reference)]
        .into_iter()
        .find_map(|id| agents.get(&id).cloned().map(|agent| (id, agent)))
}

/// Agents that route to other agents: "host" in the name, or a skill whose
/// id mentions "routing" (both case-insensitive)
pub fn is_routing_agent(agent: &AgentDescriptor) -> bool {
    agent.name.to_lowercase().contains("host")
        || agent
            .skills
            .iter()
            .any(|skill| skill.id.to_lowercase().contains("routing"))
}
