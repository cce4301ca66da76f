//! Operations shared by the REST and WebSocket surfaces

use serde_json::{Value, json};
use switchboard_a2a::AgentDescriptor;
use switchboard_core::types::{Conversation, Message, Role, meta};
use tracing::{debug, info, warn};

use crate::protocol::{GatewayEvent, events};
use crate::server::GatewayState;

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("URL is required for registering an agent. Please provide a valid URL.")]
    MissingUrl,
    #[error(
        "Could not fetch agent card from the provided URL. Please ensure the URL is correct and the server is running."
    )]
    FetchFailed,
    #[error(
        "Invalid agent card data. Please ensure all required fields are present and correctly formatted."
    )]
    InvalidData,
}

/// Post a user message to a conversation and route it to an agent.
///
/// The user message and the agent's reply are both appended to the
/// conversation; the reply is broadcast to every connection that joined
/// it, bracketed by typing events. Routing failures come back as a
/// system-role reply, never as an error.
pub async fn send_message(
    state: &GatewayState,
    conversation_id: &str,
    content: &str,
    agent_id: Option<&str>,
) -> anyhow::Result<Message> {
    let mut message = state
        .conversations
        .create_message(conversation_id, Role::User, content)
        .await;
    if let Some(agent_id) = agent_id.filter(|a| !a.is_empty()) {
        message
            .metadata
            .insert(meta::AGENT_ID.to_string(), Value::String(agent_id.to_string()));
    }
    state.conversations.append_message(message.clone()).await?;
    debug!("Routing message {} in conversation {}", message.id, conversation_id);

    let typing = json!({ "conversation_id": conversation_id });
    state.events.broadcast(GatewayEvent::scoped(
        events::TYPING_START,
        conversation_id,
        typing.clone(),
    ));

    let reply = state.agents.route(&message).await;

    state.events.broadcast(GatewayEvent::scoped(
        events::TYPING_STOP,
        conversation_id,
        typing,
    ));

    state.conversations.append_message(reply.clone()).await?;
    state.events.broadcast(GatewayEvent::scoped(
        events::MESSAGE,
        conversation_id,
        serde_json::to_value(&reply)?,
    ));
    Ok(reply)
}

/// Create a conversation and announce it to every connection
pub async fn new_conversation(state: &GatewayState, name: Option<&str>) -> anyhow::Result<Conversation> {
    let conversation = state.conversations.create_conversation(name).await;
    state.events.broadcast(GatewayEvent::new(
        events::CONVERSATION_CREATED,
        serde_json::to_value(&conversation)?,
    ));
    Ok(conversation)
}

/// Register an agent from a request body.
///
/// `{ "url": .. }` alone fetches the descriptor from the agent; a body with
/// more fields is taken as the descriptor itself.
pub async fn register_agent(state: &GatewayState, body: &Value) -> Result<AgentDescriptor, RegisterError> {
    let url = match body.get("url").and_then(Value::as_str) {
        Some(url) if !url.trim().is_empty() => url,
        _ => return Err(RegisterError::MissingUrl),
    };
    let url_only = body.as_object().is_some_and(|obj| obj.len() == 1);

    let registered = if url_only {
        state
            .agents
            .register_agent_from_url(url)
            .await
            .ok_or(RegisterError::FetchFailed)?
    } else {
        state
            .agents
            .register_agent_from_json(body.clone())
            .await
            .ok_or(RegisterError::InvalidData)?
    };

    info!("Registered agent '{}' at {}", registered.name, registered.url);
    match serde_json::to_value(&registered) {
        Ok(data) => state
            .events
            .broadcast(GatewayEvent::new(events::AGENT_REGISTERED, data)),
        Err(e) => warn!("Failed to serialize agent descriptor: {}", e),
    }
    Ok(registered)
}

/// Gateway status summary
pub async fn status(state: &GatewayState) -> Value {
    json!({
        "status": "ok",
        "conversations": state.conversations.count().await,
        "agents": state.agents.registry().len().await,
        "connected_clients": state.events.subscriber_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    })
}
