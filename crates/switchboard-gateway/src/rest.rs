//! REST routes used by the chat UI

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::auth;
use crate::chat::{self, RegisterError};
use crate::server::GatewayState;

pub fn routes() -> Router<GatewayState> {
    Router::new()
        .route("/api/status", get(status_handler))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route("/api/agents", get(list_agents).post(add_agent))
        .route("/api/agents/register-from-url", post(register_from_url))
        .route("/api/debug/test-agent-connection", post(test_agent_connection))
}

/// Error body: `{ "error": .., "message": .. }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "Missing or invalid bearer token",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.error, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<RegisterError> for ApiError {
    fn from(e: RegisterError) -> Self {
        let error = match e {
            RegisterError::MissingUrl => "Invalid agent data",
            RegisterError::FetchFailed | RegisterError::InvalidData => "Failed to register agent",
        };
        Self::bad_request(error, e.to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn authorize(state: &GatewayState, headers: &HeaderMap) -> ApiResult<()> {
    if auth::check_headers(&state.auth_token, headers) {
        Ok(())
    } else {
        Err(ApiError::unauthorized())
    }
}

/// Parse a JSON body leniently: an empty or invalid body reads as `{}`
fn json_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return json!({});
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        warn!("Ignoring unparseable request body: {}", e);
        json!({})
    })
}

fn url_param(body: &Value) -> Option<&str> {
    body.get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.trim().is_empty())
}

// ── Handlers ──

async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(chat::status(&state).await)
}

async fn list_conversations(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, &headers)?;
    Ok(Json(state.conversations.list_conversations().await))
}

async fn create_conversation(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, &headers)?;
    let body = json_body(&body);
    let name = body.get("name").and_then(Value::as_str);
    let conversation = chat::new_conversation(&state, name).await.map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "Failed to create conversation")
    })?;
    Ok(Json(conversation))
}

async fn list_messages(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, &headers)?;
    Ok(Json(state.conversations.list_messages(&id).await))
}

/// Body: `{ "content": .., "metadata": { "agent_id": .. } }`. Returns the
/// agent's reply.
async fn post_message(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, &headers)?;
    let body = json_body(&body);
    let content = match body.get("content").and_then(Value::as_str) {
        Some(c) if !c.trim().is_empty() => c,
        _ => {
            return Err(ApiError::bad_request(
                "Invalid message",
                "Missing or empty 'content' field",
            ));
        }
    };
    let agent_id = body
        .get("metadata")
        .and_then(|m| m.get("agent_id"))
        .and_then(Value::as_str);

    match chat::send_message(&state, &id, content, agent_id).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            error!("Failed to process message in {}: {}", id, e);
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                format!("Failed to process message: {}", e),
            ))
        }
    }
}

async fn list_agents(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, &headers)?;
    Ok(Json(state.agents.agents().await))
}

async fn add_agent(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    authorize(&state, &headers)?;
    let agent = chat::register_agent(&state, &json_body(&body)).await?;
    Ok(Json(agent))
}

async fn register_from_url(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    authorize(&state, &headers)?;
    let body = json_body(&body);
    let Some(url) = url_param(&body) else {
        return Ok(failure("Missing URL parameter", "Please provide a URL to register"));
    };

    let response = match state.agents.register_agent_from_url(url).await {
        Some(agent) => Json(json!({
            "success": true,
            "message": format!("Successfully registered agent: {}", agent.name),
            "agent": agent,
        }))
        .into_response(),
        None => failure(
            "Failed to register agent",
            "Could not fetch or validate agent card from the provided URL",
        ),
    };
    Ok(response)
}

/// Runs discovery without registering and returns every step taken
async fn test_agent_connection(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    authorize(&state, &headers)?;
    let body = json_body(&body);
    let Some(url) = url_param(&body) else {
        return Ok(failure("Missing URL parameter", "Please provide a URL to test"));
    };

    let report = state.agents.diagnose(url).await;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(report)).into_response())
}

fn failure(error: &str, message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": error, "message": message })),
    )
        .into_response()
}
