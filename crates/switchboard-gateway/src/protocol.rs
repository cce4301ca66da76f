//! Gateway WebSocket protocol: JSON messages between clients and the server

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → Gateway request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// Optional request ID for correlating responses
    #[serde(default)]
    pub id: Option<String>,
}

/// Gateway → Client response, delivered only to the requesting connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Echoed from the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: i32,
    pub message: String,
}

/// Gateway → Client event. Events with a `conversation_id` reach only the
/// connections that joined that conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub event: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

// ── Well-known methods ──

pub mod methods {
    pub const CONVERSATION_JOIN: &str = "conversation.join";
    pub const CONVERSATION_LIST: &str = "conversation.list";
    pub const CONVERSATION_NEW: &str = "conversation.new";
    pub const CONVERSATION_HISTORY: &str = "conversation.history";
    pub const MESSAGE_SEND: &str = "message.send";
    pub const AGENT_LIST: &str = "agent.list";
    pub const AGENT_REGISTER: &str = "agent.register";
    pub const STATUS_GET: &str = "status.get";
}

pub mod events {
    /// A message was added to a conversation
    pub const MESSAGE: &str = "message";
    pub const TYPING_START: &str = "typing.start";
    pub const TYPING_STOP: &str = "typing.stop";
    pub const CONVERSATION_CREATED: &str = "conversation.created";
    pub const AGENT_REGISTERED: &str = "agent.registered";
}

// ── Error codes ──

pub const ERR_INVALID_METHOD: i32 = -32601;
pub const ERR_INVALID_PARAMS: i32 = -32602;
pub const ERR_INTERNAL: i32 = -32603;
pub const ERR_NOT_FOUND: i32 = -32004;

impl GatewayResponse {
    pub fn ok(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(GatewayError {
                code,
                message: message.into(),
            }),
        }
    }
}

impl GatewayEvent {
    /// An event for every connected client
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            conversation_id: None,
        }
    }

    /// An event for the clients that joined `conversation_id`
    pub fn scoped(event: impl Into<String>, conversation_id: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            conversation_id: Some(conversation_id.into()),
        }
    }
}
