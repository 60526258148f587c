//! HTTP transport: router, application state, and the plain endpoints.
//!
//! Three endpoints: `POST /mcp` (JSON-RPC, SSE-capable), `GET /health`,
//! and `GET /mcp-info`. Everything else is a 404 from the router itself.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cmcp::config::ServerConfig;
use cmcp::gate::PaymentGate;
use cmcp::registry::ToolRegistry;
use cmcp::request::RequestManager;
use cmcp::telemetry::DcapEmitter;
use cmcp_proto::mcp::{ServerInfo, PROTOCOL_VERSION};
use cmcp_proto::rpc::{self, JsonRpcRequest, JsonRpcResponse};
use http::{HeaderMap, Method, StatusCode};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::reload;
use tracing_subscriber::EnvFilter;

use crate::dispatch::{self, Dispatch};
use crate::resources::{PromptStore, ResourceStore};

/// Handle for runtime log-level changes via `logging/setLevel`.
#[derive(Clone)]
pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
}

impl std::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("reloadable", &self.handle.is_some())
            .finish()
    }
}

impl LogControl {
    /// Wraps a reload handle installed at startup.
    #[must_use]
    pub fn new(handle: reload::Handle<EnvFilter, tracing_subscriber::Registry>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// A no-op control for contexts without a reloadable subscriber.
    #[must_use]
    pub fn disabled() -> Self {
        Self { handle: None }
    }

    /// Applies an MCP log level (`debug`/`info`/`warning`/`error`).
    pub fn set_level(&self, level: &str) {
        let directive = match level.to_ascii_lowercase().as_str() {
            "warning" => "warn".to_owned(),
            other => other.to_owned(),
        };
        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(EnvFilter::new(&directive)) {
                tracing::warn!("could not apply log level '{level}': {e}");
            }
        }
    }
}

/// Shared application state behind every endpoint.
#[derive(Clone)]
pub struct AppState {
    /// The immutable tool catalogue.
    pub registry: Arc<ToolRegistry>,
    /// The payment gate over the enabled rails.
    pub gate: Arc<PaymentGate>,
    /// In-flight request tracking.
    pub requests: Arc<RequestManager>,
    /// Telemetry emitter, when configured.
    pub telemetry: Option<DcapEmitter>,
    /// Resource snapshots.
    pub resources: Arc<ResourceStore>,
    /// Prompt snapshots.
    pub prompts: Arc<PromptStore>,
    /// Loaded configuration.
    pub config: Arc<ServerConfig>,
    /// Identity reported from `initialize`.
    pub server_info: ServerInfo,
    /// Runtime log-level control.
    pub log_control: LogControl,
}

impl AppState {
    /// Default server identity.
    #[must_use]
    pub fn default_server_info() -> ServerInfo {
        ServerInfo {
            name: "canton-mcp-server".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(mcp_endpoint))
        .route("/health", get(health))
        .route("/mcp-info", get(mcp_info))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}

/// `POST /mcp` — decode the JSON-RPC envelope and route it.
async fn mcp_endpoint(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    None,
                    rpc::PARSE_ERROR,
                    format!("Parse error: {e}"),
                )),
            )
                .into_response();
        }
    };

    if request.jsonrpc != "2.0" {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::error(
                request.id,
                rpc::INVALID_REQUEST,
                "Invalid JSON-RPC version",
            )),
        )
            .into_response();
    }

    match dispatch::dispatch(&state, &headers, request).await {
        Dispatch::Json(response) => Json(response).into_response(),
        Dispatch::Stream(frames) => Sse::new(crate::stream::into_sse(frames))
            .keep_alive(KeepAlive::default())
            .into_response(),
        Dispatch::Accepted => StatusCode::ACCEPTED.into_response(),
        Dispatch::PaymentRequired(body) => {
            (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
        }
        Dispatch::BadRequest(message) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": message})),
        )
            .into_response(),
    }
}

/// `GET /health`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": unix_now(),
    }))
}

/// `GET /mcp-info` — static capability descriptor.
async fn mcp_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let rails: Vec<serde_json::Value> = state
        .gate
        .rails()
        .iter()
        .map(|rail| {
            json!({
                "scheme": rail.scheme(),
                "network": rail.network(),
                "currency": rail.currency_symbol(),
            })
        })
        .collect();

    Json(json!({
        "serverInfo": state.server_info,
        "protocolVersion": PROTOCOL_VERSION,
        "transport": "streamable-http",
        "endpoint": "/mcp",
        "toolCount": state.registry.len(),
        "payment": {
            "enabled": state.gate.is_enabled(),
            "rails": rails,
        },
    }))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
