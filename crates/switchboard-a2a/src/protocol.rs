//! A2A wire protocol: JSON-RPC task envelopes and response classification
//!
//! Outbound: `tasks/send` and `tasks/get` request envelopes.
//! Inbound: agent responses are classified into [`ParsedAgentResponse`],
//! a closed set of shapes the router renders into chat messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use switchboard_core::types::{FILE_MIME, Message, Part, Role, meta};
use tracing::{debug, warn};

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC methods understood by A2A agents
pub mod methods {
    pub const TASKS_SEND: &str = "tasks/send";
    pub const TASKS_GET: &str = "tasks/get";
}

/// JSON-RPC request envelope sent to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: TaskParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskParams {
    Send(TaskSendParams),
    Query(TaskQueryParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSendParams {
    pub id: String,
    pub message: WireMessage,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQueryParams {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub parts: Vec<WirePart>,
}

/// A message part as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WirePart {
    Text { text: String },
    Data { data: Map<String, Value> },
    File { file: WireFile },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFile {
    pub mime_type: String,
    pub bytes: String,
}

impl From<&Part> for WirePart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text { text, .. } => Self::Text { text: text.clone() },
            Part::Data { data, .. } => Self::Data { data: data.clone() },
            Part::File { bytes, mime_type } => Self::File {
                file: WireFile {
                    mime_type: mime_type.clone(),
                    bytes: bytes.clone(),
                },
            },
        }
    }
}

/// A2A role names: the protocol calls the assistant side "agent"
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "agent",
        Role::System => "system",
    }
}

/// Build a `tasks/send` envelope for a chat message
pub fn build_send_request(message: &Message, task_id: &str, session_id: &str) -> RequestEnvelope {
    let mut metadata = Map::new();
    if let Some(conversation_id) = &message.conversation_id {
        metadata.insert(meta::CONVERSATION_ID.into(), conversation_id.clone().into());
    }
    metadata.insert(meta::MESSAGE_ID.into(), message.id.clone().into());
    metadata.insert(meta::TASK_ID.into(), task_id.into());
    metadata.insert(meta::SESSION_ID.into(), session_id.into());

    RequestEnvelope {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: task_id.to_string(),
        method: methods::TASKS_SEND.to_string(),
        params: TaskParams::Send(TaskSendParams {
            id: task_id.to_string(),
            message: WireMessage {
                role: wire_role(message.role).to_string(),
                parts: message.parts.iter().map(WirePart::from).collect(),
            },
            metadata,
        }),
    }
}

/// Build a `tasks/get` envelope polling the state of a task
pub fn build_get_request(task_id: &str) -> RequestEnvelope {
    RequestEnvelope {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: uuid::Uuid::new_v4().to_string(),
        method: methods::TASKS_GET.to_string(),
        params: TaskParams::Query(TaskQueryParams {
            id: task_id.to_string(),
        }),
    }
}

// ── Response classification ──

/// Every response shape an agent may answer with
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAgentResponse {
    /// `result.artifacts[].parts[]`
    Artifacts {
        parts: Vec<Part>,
        session_id: Option<String>,
    },
    /// `result.status.message.parts[]`
    StatusMessage {
        parts: Vec<Part>,
        session_id: Option<String>,
    },
    /// A finished A2A task with nothing displayable; kept untranslated
    RawPassthrough(Value),
    /// The `error` member of the response (or `{}` if neither is present)
    ErrorResult(Value),
    /// A `result` in a shape we could not translate
    Unrecognized(Value),
}

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("agent response is not a JSON object: {0}")]
    NotAnObject(String),
}

#[derive(Debug, thiserror::Error)]
#[error("malformed part: {0}")]
pub struct PartError(String);

/// Classify a decoded agent response body
pub fn classify_response(body: Value) -> Result<ParsedAgentResponse, ResponseError> {
    let Value::Object(mut body) = body else {
        return Err(ResponseError::NotAnObject(truncate(&body.to_string(), 200)));
    };

    match body.remove("result") {
        Some(result) if !result.is_null() => Ok(classify_result(result)),
        _ => {
            let error = body
                .remove("error")
                .unwrap_or_else(|| Value::Object(Map::new()));
            Ok(ParsedAgentResponse::ErrorResult(error))
        }
    }
}

/// Classify the `result` member of a successful response
pub fn classify_result(result: Value) -> ParsedAgentResponse {
    let session_id = session_id_of(&result);

    if let Some(Value::Array(artifacts)) = result.get("artifacts") {
        return match parts_from_artifacts(artifacts) {
            Ok(parts) => ParsedAgentResponse::Artifacts { parts, session_id },
            Err(e) => {
                warn!("Failed to translate artifacts, keeping raw result: {}", e);
                ParsedAgentResponse::Unrecognized(result)
            }
        };
    }

    let status_parts = result
        .get("status")
        .and_then(|s| s.get("message"))
        .and_then(|m| m.get("parts"));
    if let Some(parts) = status_parts {
        let translated = match parts {
            Value::Array(values) => parts_from_values(values),
            other => Err(PartError(format!("parts is not a list: {}", other))),
        };
        return match translated {
            Ok(parts) => ParsedAgentResponse::StatusMessage { parts, session_id },
            Err(e) => {
                warn!("Failed to translate status message, keeping raw result: {}", e);
                ParsedAgentResponse::Unrecognized(result)
            }
        };
    }

    if looks_like_finished_task(&result) {
        return ParsedAgentResponse::RawPassthrough(result);
    }

    ParsedAgentResponse::Unrecognized(result)
}

/// `sessionId` of a task result, if it has one
pub fn session_id_of(result: &Value) -> Option<String> {
    result
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn looks_like_finished_task(result: &Value) -> bool {
    let has_task_fields = result.get("artifacts").is_some() || result.get("sessionId").is_some();
    let state = result
        .get("status")
        .and_then(|s| s.get("state"))
        .and_then(Value::as_str);
    has_task_fields && matches!(state, Some("completed") | Some("failed"))
}

fn parts_from_artifacts(artifacts: &[Value]) -> Result<Vec<Part>, PartError> {
    let mut parts = Vec::new();
    for artifact in artifacts {
        let Value::Object(artifact) = artifact else {
            return Err(PartError(format!("artifact is not an object: {}", artifact)));
        };
        if let Some(Value::Array(values)) = artifact.get("parts") {
            parts.extend(parts_from_values(values)?);
        }
    }
    Ok(parts)
}

/// Translate wire parts into chat parts. Parts of unknown type are skipped.
pub fn parts_from_values(values: &[Value]) -> Result<Vec<Part>, PartError> {
    let mut parts = Vec::with_capacity(values.len());
    for value in values {
        if let Some(part) = part_from_value(value)? {
            parts.push(part);
        }
    }
    Ok(parts)
}

fn part_from_value(value: &Value) -> Result<Option<Part>, PartError> {
    let Value::Object(obj) = value else {
        return Err(PartError(format!("part is not an object: {}", value)));
    };

    match obj.get("type").and_then(Value::as_str) {
        Some("text") => match obj.get("text") {
            Some(Value::String(text)) => Ok(Some(Part::text(text.clone()))),
            None | Some(Value::Null) => Ok(None),
            Some(other) => Err(PartError(format!("text is not a string: {}", other))),
        },
        Some("data") => match obj.get("data") {
            Some(Value::Object(data)) => Ok(Some(Part::data(data.clone()))),
            None | Some(Value::Null) => Ok(Some(Part::data(Map::new()))),
            Some(other) => Err(PartError(format!("data is not an object: {}", other))),
        },
        Some("file") => match obj.get("file") {
            Some(Value::Object(file)) => {
                let bytes = match file.get("bytes") {
                    Some(Value::String(b)) => b.clone(),
                    None | Some(Value::Null) => String::new(),
                    Some(other) => {
                        return Err(PartError(format!("file bytes is not a string: {}", other)));
                    }
                };
                let mime_type = file
                    .get("mimeType")
                    .and_then(Value::as_str)
                    .unwrap_or(FILE_MIME);
                Ok(Some(Part::file(bytes, mime_type)))
            }
            None | Some(Value::Null) => Ok(None),
            Some(other) => Err(PartError(format!("file is not an object: {}", other))),
        },
        other => {
            debug!("Skipping part of unknown type {:?}", other);
            Ok(None)
        }
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn three_part_message() -> Message {
        let mut msg = Message::user("conv-1", "hello");
        let mut data = Map::new();
        data.insert("answer".into(), json!(42));
        msg.add_data(data);
        msg.add_file("aGVsbG8=", "image/png");
        msg
    }

    #[test]
    fn test_send_request_shape() {
        let msg = three_part_message();
        let envelope = build_send_request(&msg, "task-1", "session-1");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], "task-1");
        assert_eq!(json["method"], "tasks/send");
        assert_eq!(json["params"]["id"], "task-1");
        assert_eq!(json["params"]["message"]["role"], "user");

        let parts = &json["params"]["message"]["parts"];
        assert_eq!(parts[0], json!({"type": "text", "text": "hello"}));
        assert_eq!(parts[1], json!({"type": "data", "data": {"answer": 42}}));
        assert_eq!(
            parts[2],
            json!({"type": "file", "file": {"mimeType": "image/png", "bytes": "aGVsbG8="}})
        );

        let metadata = &json["params"]["metadata"];
        assert_eq!(metadata["conversation_id"], "conv-1");
        assert_eq!(metadata["message_id"], msg.id.as_str());
        assert_eq!(metadata["session_id"], "session-1");
    }

    #[test]
    fn test_get_request_shape() {
        let json = serde_json::to_value(build_get_request("task-9")).unwrap();
        assert_eq!(json["method"], "tasks/get");
        assert_eq!(json["params"], json!({"id": "task-9"}));
    }

    #[test]
    fn test_envelope_deserializes_params_variant() {
        let send = build_send_request(&three_part_message(), "t", "s");
        let text = serde_json::to_string(&send).unwrap();
        let back: RequestEnvelope = serde_json::from_str(&text).unwrap();
        assert!(matches!(back.params, TaskParams::Send(_)));

        let get: RequestEnvelope =
            serde_json::from_str(&serde_json::to_string(&build_get_request("t")).unwrap()).unwrap();
        assert!(matches!(get.params, TaskParams::Query(_)));
    }

    #[test]
    fn test_assistant_role_goes_out_as_agent() {
        let mut msg = Message::new(Role::Assistant, None);
        msg.add_text("x");
        let envelope = build_send_request(&msg, "t", "s");
        let TaskParams::Send(params) = envelope.params else {
            panic!("expected send params");
        };
        assert_eq!(params.message.role, "agent");
    }

    #[test]
    fn test_parts_survive_send_then_receive() {
        let msg = three_part_message();
        let envelope = build_send_request(&msg, "t", "s");
        let wire = serde_json::to_value(&envelope).unwrap();
        let sent_parts = wire["params"]["message"]["parts"].clone();

        let response = json!({"result": {"artifacts": [{"parts": sent_parts}]}});
        match classify_response(response).unwrap() {
            ParsedAgentResponse::Artifacts { parts, .. } => assert_eq!(parts, msg.parts),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_classify_artifacts() {
        let body = json!({"result": {
            "sessionId": "s-7",
            "artifacts": [{"parts": [{"type": "text", "text": "hi"}]}]
        }});
        assert_eq!(
            classify_response(body).unwrap(),
            ParsedAgentResponse::Artifacts {
                parts: vec![Part::text("hi")],
                session_id: Some("s-7".into()),
            }
        );
    }

    #[test]
    fn test_classify_status_message() {
        let body = json!({"result": {"status": {"state": "completed", "message": {
            "role": "agent",
            "parts": [{"type": "text", "text": "done"}, {"type": "data"}]
        }}}});
        match classify_response(body).unwrap() {
            ParsedAgentResponse::StatusMessage { parts, session_id } => {
                assert_eq!(parts, vec![Part::text("done"), Part::data(Map::new())]);
                assert!(session_id.is_none());
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_classify_raw_passthrough() {
        let result = json!({"sessionId": "s", "status": {"state": "failed"}});
        let body = json!({"result": result.clone()});
        assert_eq!(
            classify_response(body).unwrap(),
            ParsedAgentResponse::RawPassthrough(result)
        );
    }

    #[test]
    fn test_classify_unfinished_task_is_unrecognized() {
        let result = json!({"sessionId": "s", "status": {"state": "working"}});
        assert_eq!(
            classify_response(json!({"result": result.clone()})).unwrap(),
            ParsedAgentResponse::Unrecognized(result)
        );
    }

    #[test]
    fn test_malformed_artifact_falls_back_to_raw() {
        let result = json!({"artifacts": [{"parts": [{"type": "data", "data": "oops"}]}]});
        assert_eq!(
            classify_response(json!({"result": result.clone()})).unwrap(),
            ParsedAgentResponse::Unrecognized(result)
        );

        let result = json!({"artifacts": ["not-an-object"]});
        assert!(matches!(
            classify_response(json!({"result": result})).unwrap(),
            ParsedAgentResponse::Unrecognized(_)
        ));
    }

    #[test]
    fn test_classify_error() {
        let body = json!({"jsonrpc": "2.0", "id": "1", "error": {"code": 1, "message": "boom"}});
        assert_eq!(
            classify_response(body).unwrap(),
            ParsedAgentResponse::ErrorResult(json!({"code": 1, "message": "boom"}))
        );

        let body = json!({"result": null, "error": "bad"});
        assert_eq!(
            classify_response(body).unwrap(),
            ParsedAgentResponse::ErrorResult(json!("bad"))
        );

        assert_eq!(
            classify_response(json!({})).unwrap(),
            ParsedAgentResponse::ErrorResult(json!({}))
        );
    }

    #[test]
    fn test_non_object_body_is_an_error() {
        assert!(classify_response(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_unknown_and_incomplete_parts_are_skipped() {
        let parts = parts_from_values(&[
            json!({"type": "video", "url": "x"}),
            json!({"type": "text"}),
            json!({"type": "file"}),
            json!({"type": "file", "file": {"bytes": "AA=="}}),
        ])
        .unwrap();
        assert_eq!(parts, vec![Part::file("AA==", "application/octet-stream")]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
