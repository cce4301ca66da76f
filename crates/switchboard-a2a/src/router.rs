//! Message router: turns one inbound chat message into one reply
//!
//! The reply is always a [`Message`]: the agent's answer translated into
//! parts, or a system message describing what went wrong.

use serde_json::Value;
use std::sync::Arc;
use switchboard_core::types::{Message, Role, meta};
use tracing::{error, info, warn};

use crate::card::AgentId;
use crate::client::{AgentTransport, ClientError};
use crate::protocol::{ParsedAgentResponse, ResponseError, build_send_request, classify_response, session_id_of};
use crate::registry::AgentRegistry;
use crate::selector::select_agent;

pub const NO_AGENT_TEXT: &str = "No AI agent is available to process your message. \
Please add an agent first by clicking the 'Add Agent' button in the sidebar.";

/// Why a dispatched task produced no usable answer
#[derive(Debug, thiserror::Error)]
enum RouteFailure {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Response(#[from] ResponseError),
}

/// Routes chat messages to agents over an [`AgentTransport`]
#[derive(Clone)]
pub struct MessageRouter {
    transport: Arc<dyn AgentTransport>,
    default_token: Option<String>,
}

impl MessageRouter {
    pub fn new(transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            transport,
            default_token: None,
        }
    }

    /// Bearer token used for agents registered without their own token
    pub fn with_default_token(mut self, token: Option<String>) -> Self {
        self.default_token = token.filter(|t| !t.is_empty());
        self
    }

    /// Route `message` to the agent chosen from `registry` and return the
    /// reply. Never fails: every failure becomes a system message.
    pub async fn route(&self, message: &Message, registry: &AgentRegistry) -> Message {
        let conversation_id = message.conversation_id.clone();
        info!("Processing message {}", message.id);

        let agents = registry.snapshot().await;
        let Some((agent_id, agent)) = select_agent(message, &agents) else {
            warn!("No agent available for message {}", message.id);
            return Message::system(conversation_id, NO_AGENT_TEXT);
        };

        let task_id = uuid::Uuid::new_v4().to_string();
        let session_id = message
            .metadata_str(meta::SESSION_ID)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let envelope = build_send_request(message, &task_id, &session_id);
        let token = registry
            .auth_token(&agent_id)
            .await
            .or_else(|| self.default_token.clone());

        info!("Sending task {} to agent {} at {}", task_id, agent.name, agent.url);
        let outcome = match self.transport.send(&agent.url, &envelope, token.as_deref()).await {
            Ok(body) => classify_response(body).map_err(RouteFailure::from),
            Err(e) => Err(RouteFailure::from(e)),
        };

        match outcome {
            Ok(parsed) => {
                let reply = Reply {
                    conversation_id,
                    agent_id: &agent_id,
                    task_id: &task_id,
                    session_id: &session_id,
                };
                reply.render(parsed)
            }
            Err(RouteFailure::Client(e)) => {
                error!("A2A client error talking to {}: {}", agent.url, e);
                Message::system(conversation_id, client_error_text(&e))
            }
            Err(RouteFailure::Response(e)) => {
                error!("Error processing response from {}: {}", agent.url, e);
                Message::system(conversation_id, generic_error_text(&e))
            }
        }
    }
}

/// Correlation data stamped on a successful reply
struct Reply<'a> {
    conversation_id: Option<String>,
    agent_id: &'a AgentId,
    task_id: &'a str,
    session_id: &'a str,
}

impl Reply<'_> {
    fn render(self, parsed: ParsedAgentResponse) -> Message {
        match parsed {
            ParsedAgentResponse::Artifacts { parts, session_id }
            | ParsedAgentResponse::StatusMessage { parts, session_id } => {
                let mut reply = self.assistant(session_id);
                reply.parts = parts;
                reply
            }
            ParsedAgentResponse::RawPassthrough(result) => {
                let mut reply = self
                    .assistant(session_id_of(&result))
                    .with_metadata(meta::IS_RAW_RESPONSE, true);
                reply.raw = Some(result);
                reply
            }
            ParsedAgentResponse::Unrecognized(result) => {
                let mut reply = self.assistant(session_id_of(&result));
                reply.add_text(result.to_string());
                reply
            }
            ParsedAgentResponse::ErrorResult(error) => {
                warn!("Agent returned an error for task {}: {}", self.task_id, error);
                let text = match &error {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Message::system(self.conversation_id, format!("Error from agent: {}", text))
            }
        }
    }

    fn assistant(&self, agent_session: Option<String>) -> Message {
        Message::new(Role::Assistant, self.conversation_id.clone())
            .with_metadata(meta::AGENT_ID, self.agent_id.as_str())
            .with_metadata(meta::TASK_ID, self.task_id)
            .with_metadata(
                meta::SESSION_ID,
                agent_session.unwrap_or_else(|| self.session_id.to_string()),
            )
    }
}

fn client_error_text(err: &ClientError) -> String {
    format!(
        "Error communicating with agent: {}\n\n\
         Please make sure the agent server is running and accessible.\n\n\
         To fix this issue:\n\
         1. Check that the agent URL is correct and formatted properly (no double slashes)\n\
         2. Ensure the agent server supports the A2A protocol\n\
         3. Check agent server logs for more details\n\
         4. Try adding a different agent\n",
        err
    )
}

fn generic_error_text(err: &ResponseError) -> String {
    format!(
        "Error processing message: {}\n\n\
         Please make sure the agent server is running and accessible.\n\n\
         To fix this issue:\n\
         1. Check that the agent URL is correct and the server is running\n\
         2. Ensure your network connection is stable\n\
         3. Try adding a different agent\n",
        err
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::AgentDescriptor;
    use crate::protocol::{RequestEnvelope, TaskParams};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Transport that answers every request with a canned result
    struct CannedTransport {
        answer: fn() -> Result<Value, ClientError>,
        seen: Mutex<Vec<(String, RequestEnvelope, Option<String>)>>,
    }

    impl CannedTransport {
        fn new(answer: fn() -> Result<Value, ClientError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AgentTransport for CannedTransport {
        async fn send(
            &self,
            url: &str,
            envelope: &RequestEnvelope,
            auth_token: Option<&str>,
        ) -> Result<Value, ClientError> {
            self.seen.lock().unwrap().push((
                url.to_string(),
                envelope.clone(),
                auth_token.map(str::to_string),
            ));
            (self.answer)()
        }
    }

    async fn one_agent() -> AgentRegistry {
        let registry = AgentRegistry::new();
        registry
            .register(AgentDescriptor::new("Echo", "http://echo.local"))
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_no_agent_yields_system_message() {
        let transport = CannedTransport::new(|| Ok(json!({})));
        let router = MessageRouter::new(transport.clone());
        let reply = router
            .route(&Message::user("c1", "hi"), &AgentRegistry::new())
            .await;
        assert_eq!(reply.role, Role::System);
        assert_eq!(reply.text(), NO_AGENT_TEXT);
        assert_eq!(reply.conversation_id.as_deref(), Some("c1"));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_artifact_reply() {
        let transport = CannedTransport::new(|| {
            Ok(json!({"result": {"artifacts": [{"parts": [{"type": "text", "text": "hi"}]}]}}))
        });
        let router = MessageRouter::new(transport.clone());
        let registry = one_agent().await;
        let reply = router.route(&Message::user("c1", "hello"), &registry).await;

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.text(), "hi");
        assert_eq!(reply.conversation_id.as_deref(), Some("c1"));
        assert_eq!(
            reply.metadata_str(meta::AGENT_ID),
            Some(AgentId::from_url("http://echo.local").as_str())
        );

        let seen = transport.seen.lock().unwrap();
        let (url, envelope, token) = &seen[0];
        assert_eq!(url, "http://echo.local");
        assert!(token.is_none());
        assert_eq!(reply.metadata_str(meta::TASK_ID), Some(envelope.id.as_str()));
    }

    #[tokio::test]
    async fn test_session_id_reused_and_overridden_by_agent() {
        let transport = CannedTransport::new(|| {
            Ok(json!({"result": {"status": {"message": {"parts": [{"type": "text", "text": "ok"}]}}}}))
        });
        let router = MessageRouter::new(transport.clone());
        let registry = one_agent().await;
        let msg = Message::user("c1", "hello").with_metadata(meta::SESSION_ID, "sess-1");
        let reply = router.route(&msg, &registry).await;
        assert_eq!(reply.metadata_str(meta::SESSION_ID), Some("sess-1"));

        let seen = transport.seen.lock().unwrap();
        let TaskParams::Send(params) = &seen[0].1.params else {
            panic!("expected tasks/send");
        };
        assert_eq!(params.metadata["session_id"], "sess-1");
        drop(seen);

        let transport = CannedTransport::new(|| {
            Ok(json!({"result": {"sessionId": "agent-sess", "artifacts": []}}))
        });
        let router = MessageRouter::new(transport);
        let reply = router.route(&msg, &registry).await;
        assert_eq!(reply.metadata_str(meta::SESSION_ID), Some("agent-sess"));
        assert!(reply.parts.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_yields_guidance() {
        let transport = CannedTransport::new(|| {
            Err(ClientError::Http {
                status: 500,
                detail: "Internal Server Error".into(),
            })
        });
        let router = MessageRouter::new(transport);
        let reply = router.route(&Message::user("c1", "hi"), &one_agent().await).await;
        assert_eq!(reply.role, Role::System);
        let text = reply.text();
        assert!(text.contains("Error communicating with agent"));
        assert!(text.contains("HTTP error 500"));
        assert!(text.contains("Check that the agent URL is correct"));
        assert_eq!(reply.conversation_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_agent_error_result() {
        let transport =
            CannedTransport::new(|| Ok(json!({"error": {"code": 1, "message": "boom"}})));
        let router = MessageRouter::new(transport);
        let reply = router.route(&Message::user("c1", "hi"), &one_agent().await).await;
        assert_eq!(reply.role, Role::System);
        assert!(reply.text().starts_with("Error from agent: "));
        assert!(reply.text().contains("boom"));
    }

    #[tokio::test]
    async fn test_non_object_body_uses_generic_template() {
        let transport = CannedTransport::new(|| Ok(json!(["unexpected"])));
        let router = MessageRouter::new(transport);
        let reply = router.route(&Message::user("c1", "hi"), &one_agent().await).await;
        assert_eq!(reply.role, Role::System);
        assert!(reply.text().starts_with("Error processing message:"));
        assert!(reply.text().contains("Check that the agent URL is correct"));
    }

    #[tokio::test]
    async fn test_raw_passthrough_is_tagged() {
        let transport = CannedTransport::new(|| {
            Ok(json!({"result": {"sessionId": "s9", "status": {"state": "completed"}}}))
        });
        let router = MessageRouter::new(transport);
        let reply = router.route(&Message::user("c1", "hi"), &one_agent().await).await;
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.metadata.get(meta::IS_RAW_RESPONSE), Some(&json!(true)));
        assert_eq!(reply.raw.as_ref().unwrap()["sessionId"], "s9");
        assert!(reply.parts.is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_result_is_stringified() {
        let transport = CannedTransport::new(|| Ok(json!({"result": {"answer": 42}})));
        let router = MessageRouter::new(transport);
        let reply = router.route(&Message::user("c1", "hi"), &one_agent().await).await;
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.text(), r#"{"answer":42}"#);
    }

    #[tokio::test]
    async fn test_token_resolution() {
        let transport = CannedTransport::new(|| Ok(json!({"result": {"artifacts": []}})));
        let router = MessageRouter::new(transport.clone()).with_default_token(Some("fallback".into()));

        let registry = one_agent().await;
        router.route(&Message::user("c1", "hi"), &registry).await;

        registry
            .register_with_token(AgentDescriptor::new("Echo", "http://echo.local"), Some("own".into()))
            .await
            .unwrap();
        router.route(&Message::user("c1", "hi"), &registry).await;

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].2.as_deref(), Some("fallback"));
        assert_eq!(seen[1].2.as_deref(), Some("own"));
    }
}
