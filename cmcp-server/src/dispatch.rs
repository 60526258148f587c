//! JSON-RPC method routing.
//!
//! Routes a decoded envelope to its handler and shapes the outcome for
//! the transport: a single JSON body, an SSE frame stream, a bare 202 for
//! notifications, a 402 payment demand, or a 400. Key-case translation of
//! tool arguments happens here, before validation; nothing downstream
//! sees camelCase keys.

use std::sync::Arc;

use cmcp::gate::GateOutcome;
use cmcp::request::RequestState;
use cmcp_proto::case::keys_to_snake;
use cmcp_proto::mcp::{
    InitializeResult, ListCapability, ListPromptsResult, ListResourcesResult, ListToolsResult,
    ReadResourceResult, ServerCapabilities, PROTOCOL_VERSION,
};
use cmcp_proto::rpc::{self, JsonRpcRequest, JsonRpcResponse};
use cmcp_proto::x402::PaymentRequired;
use http::HeaderMap;
use serde_json::{json, Value};

use crate::server::AppState;
use crate::stream::{self, FrameStream};

/// Shaped outcome of one dispatched envelope.
pub enum Dispatch {
    /// Single JSON-RPC response body.
    Json(JsonRpcResponse),
    /// SSE frame stream for a running tool call.
    Stream(FrameStream),
    /// Notification accepted, no body.
    Accepted,
    /// Payment missing or rejected: HTTP 402 with this body.
    PaymentRequired(PaymentRequired),
    /// Malformed request: HTTP 400.
    BadRequest(String),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(_) => f.write_str("Json"),
            Self::Stream(_) => f.write_str("Stream"),
            Self::Accepted => f.write_str("Accepted"),
            Self::PaymentRequired(_) => f.write_str("PaymentRequired"),
            Self::BadRequest(msg) => f.debug_tuple("BadRequest").field(msg).finish(),
        }
    }
}

/// Routes one envelope.
pub async fn dispatch(state: &AppState, headers: &HeaderMap, request: JsonRpcRequest) -> Dispatch {
    let id = request.id.clone();
    let params = request.params_object();

    match request.method.as_str() {
        "initialize" => Dispatch::Json(initialize(state, id, &params)),
        "ping" => Dispatch::Json(JsonRpcResponse::success(id, json!({}))),
        "tools/list" => Dispatch::Json(tools_list(state, id)),
        "tools/call" => tools_call(state, headers, id, &params).await,
        "resources/list" => Dispatch::Json(resources_list(state, id)),
        "resources/read" => Dispatch::Json(resources_read(state, id, &params)),
        "prompts/list" => Dispatch::Json(prompts_list(state, id)),
        "prompts/get" => Dispatch::Json(prompts_get(state, id, &params)),
        "logging/setLevel" => Dispatch::Json(set_level(state, id, &params)),
        "notifications/initialized" => {
            tracing::debug!("client initialized");
            Dispatch::Accepted
        }
        "notifications/cancel" | "notifications/cancelled" => {
            cancel_notification(state, &params);
            Dispatch::Accepted
        }
        other => Dispatch::Json(JsonRpcResponse::error(
            id,
            rpc::METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    }
}

fn initialize(state: &AppState, id: Option<Value>, params: &Value) -> JsonRpcResponse {
    if let Some(client) = params.get("clientInfo") {
        tracing::info!(
            client = client.get("name").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            version = client.get("version").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "client connected"
        );
    }

    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_owned(),
        capabilities: ServerCapabilities {
            tools: ListCapability { list_changed: false },
            resources: ListCapability { list_changed: false },
            prompts: ListCapability { list_changed: false },
            logging: json!({}),
        },
        server_info: state.server_info.clone(),
    };

    JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or_default())
}

fn tools_list(state: &AppState, id: Option<Value>) -> JsonRpcResponse {
    let result = ListToolsResult {
        tools: state.registry.descriptors(),
    };
    tracing::debug!(count = result.tools.len(), "listing tools");
    JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or_default())
}

async fn tools_call(
    state: &AppState,
    headers: &HeaderMap,
    id: Option<Value>,
    params: &Value,
) -> Dispatch {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return Dispatch::Json(JsonRpcResponse::error(
            id,
            rpc::INVALID_PARAMS,
            "Missing required parameter: name",
        ));
    };

    let raw_args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    let args = keys_to_snake(&raw_args);

    let Some(tool) = state.registry.lookup(name) else {
        tracing::warn!(tool = %name, "tool not found");
        return Dispatch::Json(JsonRpcResponse::error_with_data(
            id,
            rpc::METHOD_NOT_FOUND,
            format!("Tool '{name}' not found"),
            json!({"tool": name}),
        ));
    };
    let tool = Arc::clone(tool);

    if let Err(detail) = tool.validate_params(&args) {
        tracing::warn!(tool = %name, "validation failed: {detail}");
        return Dispatch::Json(JsonRpcResponse::error(
            id,
            rpc::INVALID_PARAMS,
            format!("Validation failed: {detail}"),
        ));
    }

    let request_key = id_key(id.as_ref());
    let entry = state.requests.register(&request_key, "tools/call");

    entry.set_state(RequestState::Verifying);
    let pricing = tool.pricing();
    match state.gate.check(headers, name, &pricing, &args).await {
        GateOutcome::Free => Dispatch::Stream(stream::run_tool_call(
            Arc::clone(&state.requests),
            Arc::clone(&state.gate),
            state.telemetry.clone(),
            tool,
            entry,
            args,
            None,
        )),
        GateOutcome::Verified(receipt) => Dispatch::Stream(stream::run_tool_call(
            Arc::clone(&state.requests),
            Arc::clone(&state.gate),
            state.telemetry.clone(),
            tool,
            entry,
            args,
            Some(*receipt),
        )),
        GateOutcome::Required(body) => {
            state.requests.complete(&request_key, RequestState::Failed);
            Dispatch::PaymentRequired(body)
        }
        GateOutcome::UnknownScheme(scheme) => {
            state.requests.complete(&request_key, RequestState::Failed);
            Dispatch::BadRequest(format!("Unknown payment scheme: {scheme}"))
        }
    }
}

fn resources_list(state: &AppState, id: Option<Value>) -> JsonRpcResponse {
    let result = ListResourcesResult {
        resources: state.resources.list(),
    };
    JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or_default())
}

fn resources_read(state: &AppState, id: Option<Value>, params: &Value) -> JsonRpcResponse {
    let Some(uri) = params.get("uri").and_then(Value::as_str) else {
        return JsonRpcResponse::error(id, rpc::INVALID_PARAMS, "Missing required parameter: uri");
    };

    match state.resources.read(uri) {
        Some(contents) => {
            let result = ReadResourceResult {
                contents: vec![contents],
            };
            JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or_default())
        }
        None => JsonRpcResponse::error_with_data(
            id,
            rpc::METHOD_NOT_FOUND,
            format!("Resource not found: {uri}"),
            json!({"uri": uri}),
        ),
    }
}

fn prompts_list(state: &AppState, id: Option<Value>) -> JsonRpcResponse {
    let result = ListPromptsResult {
        prompts: state.prompts.list(),
    };
    JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or_default())
}

fn prompts_get(state: &AppState, id: Option<Value>, params: &Value) -> JsonRpcResponse {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return JsonRpcResponse::error(id, rpc::INVALID_PARAMS, "Missing required parameter: name");
    };

    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    match state.prompts.get(name, &arguments) {
        Some(result) => {
            JsonRpcResponse::success(id, serde_json::to_value(result).unwrap_or_default())
        }
        None => JsonRpcResponse::error_with_data(
            id,
            rpc::METHOD_NOT_FOUND,
            format!("Prompt not found: {name}"),
            json!({"prompt": name}),
        ),
    }
}

fn set_level(state: &AppState, id: Option<Value>, params: &Value) -> JsonRpcResponse {
    let Some(level) = params.get("level").and_then(Value::as_str) else {
        return JsonRpcResponse::error(id, rpc::INVALID_PARAMS, "Missing required parameter: level");
    };
    tracing::info!("setting log level to {level}");
    state.log_control.set_level(level);
    JsonRpcResponse::success(id, json!({}))
}

fn cancel_notification(state: &AppState, params: &Value) {
    let Some(request_id) = params.get("requestId") else {
        return;
    };
    let reason = params
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_owned);
    state
        .requests
        .mark_cancelled(&id_key(Some(request_id)), reason);
}

/// Normalizes a JSON-RPC id into the request-map key.
fn id_key(id: Option<&Value>) -> String {
    match id {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
        None => "null".to_owned(),
    }
}
