//! Chat data model shared by the router, the store and the gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known metadata keys carried on messages.
///
/// Keys are stored in snake_case. Readers also accept the camelCase
/// spelling (`agentId`, `sessionId`, ...) that some clients send.
pub mod meta {
    pub const AGENT_ID: &str = "agent_id";
    pub const TASK_ID: &str = "task_id";
    pub const SESSION_ID: &str = "session_id";
    pub const CONVERSATION_ID: &str = "conversation_id";
    pub const MESSAGE_ID: &str = "message_id";
    pub const IS_RAW_RESPONSE: &str = "is_raw_response";
}

pub const TEXT_MIME: &str = "text/plain";
pub const DATA_MIME: &str = "application/json";
pub const FILE_MIME: &str = "application/octet-stream";

/// Who authored a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "agent")]
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

fn default_text_mime() -> String {
    TEXT_MIME.to_string()
}

fn default_data_mime() -> String {
    DATA_MIME.to_string()
}

fn default_file_mime() -> String {
    FILE_MIME.to_string()
}

/// One typed payload inside a message. Exactly one payload kind per part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
        #[serde(default = "default_text_mime")]
        mime_type: String,
    },
    Data {
        data: Map<String, Value>,
        #[serde(default = "default_data_mime")]
        mime_type: String,
    },
    /// File content, base64 encoded as it travels on the wire
    File {
        bytes: String,
        #[serde(default = "default_file_mime")]
        mime_type: String,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            mime_type: default_text_mime(),
        }
    }

    pub fn data(data: Map<String, Value>) -> Self {
        Self::Data {
            data,
            mime_type: default_data_mime(),
        }
    }

    pub fn file(bytes: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::File {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            Self::Text { mime_type, .. }
            | Self::Data { mime_type, .. }
            | Self::File { mime_type, .. } => mime_type,
        }
    }

    /// Short kind name (`text`, `data`, `file`)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Data { .. } => "data",
            Self::File { .. } => "file",
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Untranslated agent payload, kept when the agent answered in a shape
    /// that is recognized but has no displayable parts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl Message {
    pub fn new(role: Role, conversation_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            parts: Vec::new(),
            metadata: Map::new(),
            created_at: Utc::now(),
            conversation_id,
            raw: None,
        }
    }

    pub fn user(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut message = Self::new(Role::User, Some(conversation_id.into()));
        message.add_text(text);
        message
    }

    /// A system message with a single text part
    pub fn system(conversation_id: Option<String>, text: impl Into<String>) -> Self {
        let mut message = Self::new(Role::System, conversation_id);
        message.add_text(text);
        message
    }

    pub fn add_text(&mut self, text: impl Into<String>) {
        self.parts.push(Part::text(text));
    }

    pub fn add_data(&mut self, data: Map<String, Value>) {
        self.parts.push(Part::data(data));
    }

    pub fn add_file(&mut self, bytes: impl Into<String>, mime_type: impl Into<String>) {
        self.parts.push(Part::file(bytes, mime_type));
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Look up a string metadata value by its snake_case key, falling back
    /// to the camelCase spelling. Empty strings count as absent.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        let found = self
            .metadata
            .get(key)
            .or_else(|| self.metadata.get(&camel_case(key)))?;
        found.as_str().filter(|s| !s.is_empty())
    }

    /// All text parts joined with newlines
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// A conversation between the operator and one or more agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_active: true,
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }
}
