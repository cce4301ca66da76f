//! Gateway server: axum HTTP + WebSocket front door

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use switchboard_a2a::AgentManager;
use switchboard_core::ConversationStore;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::auth;
use crate::chat;
use crate::events::{EventBus, Rooms};
use crate::protocol::{
    ERR_INTERNAL, ERR_INVALID_METHOD, ERR_INVALID_PARAMS, ERR_NOT_FOUND, GatewayRequest,
    GatewayResponse, methods,
};
use crate::rest;

const EVENT_CAPACITY: usize = 256;

/// Shared state for every request and connection
#[derive(Clone)]
pub struct GatewayState {
    pub conversations: Arc<ConversationStore>,
    pub agents: Arc<AgentManager>,
    pub events: EventBus,
    pub auth_token: String,
    pub start_time: Instant,
    /// Cancelled when the server shuts down; open sockets close on it
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(agents: Arc<AgentManager>, auth_token: String) -> Self {
        Self {
            conversations: Arc::new(ConversationStore::new()),
            agents,
            events: EventBus::new(EVENT_CAPACITY),
            auth_token,
            start_time: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }
}

pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, state: GatewayState) -> Self {
        Self { state, bind }
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .merge(rest::routes())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve until the shutdown token is cancelled
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until the shutdown token is cancelled
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let router = self.router();
        let shutdown = self.state.shutdown.clone();
        info!("Gateway listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

        info!("Gateway stopped");
        Ok(())
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

// ── WebSocket Handler ──

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    // Browsers cannot set headers on a WebSocket upgrade, so `?token=` is
    // accepted too
    let query_ok = query
        .get("token")
        .is_some_and(|t| auth::validate_token(&state.auth_token, t));
    if !query_ok && !auth::check_headers(&state.auth_token, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    info!("WebSocket connection from {}", addr);
    ws.on_upgrade(move |socket| handle_ws(socket, state, addr))
        .into_response()
}

async fn handle_ws(socket: WebSocket, state: GatewayState, addr: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut event_rx = state.events.subscribe();
    let rooms = Rooms::new();
    let (reply_tx, mut reply_rx) = mpsc::channel::<GatewayResponse>(64);

    // Single writer: responses for this client plus the events it may see
    let writer_rooms = rooms.clone();
    let shutdown = state.shutdown.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let outgoing = tokio::select! {
                Some(response) = reply_rx.recv() => serde_json::to_string(&response),
                event = event_rx.recv() => match event {
                    Ok(event) => {
                        if !writer_rooms.accepts(&event).await {
                            continue;
                        }
                        serde_json::to_string(&event)
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} lagged by {} events", addr, n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.cancelled() => {
                    let _ = ws_sender.send(WsMessage::Close(None)).await;
                    break;
                }
            };
            let json = match outgoing {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize outgoing frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        let frame = tokio::select! {
            frame = ws_receiver.next() => frame,
            _ = state.shutdown.cancelled() => break,
        };
        let text = match frame {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("WebSocket error from {}: {}", addr, e);
                break;
            }
        };

        let req = match parse_request(text.as_str()) {
            Ok(req) => req,
            Err(response) => {
                let _ = reply_tx.send(response).await;
                continue;
            }
        };

        if req.method == methods::MESSAGE_SEND {
            // Routing can take as long as the agent does; keep reading
            let state = state.clone();
            let rooms = rooms.clone();
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                let response = dispatch(&state, &rooms, req).await;
                let _ = reply_tx.send(response).await;
            });
        } else {
            let response = dispatch(&state, &rooms, req).await;
            if reply_tx.send(response).await.is_err() {
                break;
            }
        }
    }

    send_task.abort();
    info!("Client {} disconnected", addr);
}

fn parse_request(raw: &str) -> Result<GatewayRequest, GatewayResponse> {
    serde_json::from_str(raw)
        .map_err(|e| GatewayResponse::err(None, ERR_INVALID_PARAMS, format!("Invalid JSON: {}", e)))
}

/// Parse and answer one request from a connection
pub async fn handle_request(state: &GatewayState, rooms: &Rooms, raw: &str) -> GatewayResponse {
    match parse_request(raw) {
        Ok(req) => dispatch(state, rooms, req).await,
        Err(response) => response,
    }
}

async fn dispatch(state: &GatewayState, rooms: &Rooms, req: GatewayRequest) -> GatewayResponse {
    let id = req.id.clone();
    debug!("Gateway request: {}", req.method);

    match req.method.as_str() {
        methods::STATUS_GET => GatewayResponse::ok(id, chat::status(state).await),

        methods::CONVERSATION_LIST => {
            ok_json(id, &state.conversations.list_conversations().await)
        }

        methods::CONVERSATION_NEW => {
            let name = str_param(&req.params, "name");
            match chat::new_conversation(state, name).await {
                Ok(conversation) => ok_json(id, &conversation),
                Err(e) => GatewayResponse::err(id, ERR_INTERNAL, e.to_string()),
            }
        }

        methods::CONVERSATION_JOIN => {
            let Some(conversation_id) = str_param(&req.params, "conversation_id") else {
                return missing_param(id, "conversation_id");
            };
            if rooms.join(conversation_id).await {
                debug!("Connection joined conversation {}", conversation_id);
            }
            let messages = state.conversations.list_messages(conversation_id).await;
            ok_json(
                id,
                &json!({ "conversation_id": conversation_id, "messages": messages }),
            )
        }

        methods::CONVERSATION_HISTORY => {
            let Some(conversation_id) = str_param(&req.params, "conversation_id") else {
                return missing_param(id, "conversation_id");
            };
            match state.conversations.get_conversation(conversation_id).await {
                Some(conversation) => ok_json(
                    id,
                    &json!({
                        "conversation_id": conversation.id,
                        "messages": conversation.messages,
                    }),
                ),
                None => GatewayResponse::err(
                    id,
                    ERR_NOT_FOUND,
                    format!("Conversation '{}' not found", conversation_id),
                ),
            }
        }

        methods::MESSAGE_SEND => {
            let Some(conversation_id) = str_param(&req.params, "conversation_id") else {
                return missing_param(id, "conversation_id");
            };
            let Some(content) = str_param(&req.params, "content") else {
                return missing_param(id, "content");
            };
            let agent_id = str_param(&req.params, "agent_id");
            match chat::send_message(state, conversation_id, content, agent_id).await {
                Ok(reply) => ok_json(id, &reply),
                Err(e) => {
                    error!("Failed to process message: {}", e);
                    GatewayResponse::err(id, ERR_INTERNAL, format!("Failed to process message: {}", e))
                }
            }
        }

        methods::AGENT_LIST => ok_json(id, &state.agents.agents().await),

        methods::AGENT_REGISTER => match chat::register_agent(state, &req.params).await {
            Ok(agent) => ok_json(id, &agent),
            Err(e) => GatewayResponse::err(id, ERR_INVALID_PARAMS, e.to_string()),
        },

        _ => GatewayResponse::err(
            id,
            ERR_INVALID_METHOD,
            format!("Unknown method: {}", req.method),
        ),
    }
}

/// Non-empty string parameter
fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn missing_param(id: Option<String>, key: &str) -> GatewayResponse {
    GatewayResponse::err(
        id,
        ERR_INVALID_PARAMS,
        format!("Missing or empty '{}' parameter", key),
    )
}

fn ok_json<T: Serialize>(id: Option<String>, value: &T) -> GatewayResponse {
    match serde_json::to_value(value) {
        Ok(v) => GatewayResponse::ok(id, v),
        Err(e) => GatewayResponse::err(id, ERR_INTERNAL, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GatewayState {
        GatewayState::new(Arc::new(AgentManager::default()), String::new())
    }

    #[tokio::test]
    async fn test_handle_request_status() {
        let state = state();
        let resp = handle_request(&state, &Rooms::new(), r#"{"method":"status.get","id":"s1"}"#).await;
        assert_eq!(resp.id.as_deref(), Some("s1"));
        let result = resp.result.unwrap();
        assert_eq!(result["status"], "ok");
        assert_eq!(result["agents"], 0);
    }

    #[tokio::test]
    async fn test_handle_request_conversation_new_and_list() {
        let state = state();
        let rooms = Rooms::new();
        let resp = handle_request(
            &state,
            &rooms,
            r#"{"method":"conversation.new","params":{"name":"Research"}}"#,
        )
        .await;
        assert_eq!(resp.result.unwrap()["name"], "Research");

        let resp = handle_request(&state, &rooms, r#"{"method":"conversation.new"}"#).await;
        assert_eq!(resp.result.unwrap()["name"], "Conversation 2");

        let resp = handle_request(&state, &rooms, r#"{"method":"conversation.list"}"#).await;
        assert_eq!(resp.result.unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_handle_request_join_scopes_connection() {
        let state = state();
        let rooms = Rooms::new();
        let resp = handle_request(
            &state,
            &rooms,
            r#"{"method":"conversation.join","params":{"conversation_id":"c1"}}"#,
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["conversation_id"], "c1");
        assert!(result["messages"].as_array().unwrap().is_empty());
        assert!(rooms.contains("c1").await);
        assert!(!rooms.contains("c2").await);
    }

    #[tokio::test]
    async fn test_handle_request_history() {
        let state = state();
        let rooms = Rooms::new();
        let resp = handle_request(
            &state,
            &rooms,
            r#"{"method":"conversation.history","params":{"conversation_id":"nope"}}"#,
        )
        .await;
        assert_eq!(resp.error.unwrap().code, ERR_NOT_FOUND);

        handle_request(
            &state,
            &rooms,
            r#"{"method":"message.send","params":{"conversation_id":"c1","content":"hi"}}"#,
        )
        .await;
        let resp = handle_request(
            &state,
            &rooms,
            r#"{"method":"conversation.history","params":{"conversation_id":"c1"}}"#,
        )
        .await;
        assert_eq!(resp.result.unwrap()["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_handle_request_message_send_without_agents() {
        let state = state();
        let resp = handle_request(
            &state,
            &Rooms::new(),
            r#"{"method":"message.send","params":{"conversation_id":"c1","content":"hello"},"id":"m1"}"#,
        )
        .await;
        let reply = resp.result.unwrap();
        assert_eq!(reply["role"], "system");
        assert_eq!(reply["conversation_id"], "c1");
    }

    #[tokio::test]
    async fn test_handle_request_message_send_validation() {
        let state = state();
        let rooms = Rooms::new();
        for raw in [
            r#"{"method":"message.send","params":{"conversation_id":"c1","content":""}}"#,
            r#"{"method":"message.send","params":{"content":"hi"}}"#,
        ] {
            let resp = handle_request(&state, &rooms, raw).await;
            assert_eq!(resp.error.unwrap().code, ERR_INVALID_PARAMS);
        }
        assert_eq!(state.conversations.count().await, 0);
    }

    #[tokio::test]
    async fn test_handle_request_agent_register_and_list() {
        let state = state();
        let rooms = Rooms::new();
        let resp = handle_request(
            &state,
            &rooms,
            r#"{"method":"agent.register","params":{"url":"http://localhost:7000","name":"Echo"}}"#,
        )
        .await;
        assert_eq!(resp.result.unwrap()["name"], "Echo");

        let resp = handle_request(&state, &rooms, r#"{"method":"agent.list"}"#).await;
        let agents = resp.result.unwrap();
        assert_eq!(agents[0]["name"], "Echo");
        assert!(agents[0]["id"].as_str().unwrap().starts_with("agent-"));

        let resp = handle_request(&state, &rooms, r#"{"method":"agent.register","params":{}}"#).await;
        assert_eq!(resp.error.unwrap().code, ERR_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_handle_request_unknown_method() {
        let resp = handle_request(&state(), &Rooms::new(), r#"{"method":"unknown"}"#).await;
        assert_eq!(resp.error.unwrap().code, ERR_INVALID_METHOD);
    }

    #[tokio::test]
    async fn test_handle_request_invalid_json() {
        let resp = handle_request(&state(), &Rooms::new(), "not json").await;
        assert_eq!(resp.error.unwrap().code, ERR_INVALID_PARAMS);
    }
}
