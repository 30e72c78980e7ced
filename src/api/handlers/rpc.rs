/*
 * Responsibility
 * - POST /mcp: JSON-RPC 2.0 (単発 / batch / notification) の受付
 * - initialize / ping / tools/list / tools/call の dispatch
 * - ToolError を JSON-RPC error (code / message / data) に落とす
 */
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::dto::jsonrpc::{
    INVALID_PARAMS, INVALID_REQUEST, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    METHOD_NOT_FOUND, PARSE_ERROR, RequestId,
};
use crate::api::extractors::{AuthCtx, AuthCtxExtractor};
use crate::services::tools::{ToolError, ToolService};
use crate::state::AppState;

pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub async fn mcp(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    body: Bytes,
) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable JSON-RPC body");
            let error = JsonRpcError::new(PARSE_ERROR, "Parse error");
            return (StatusCode::BAD_REQUEST, Json(JsonRpcResponse::error(None, error)))
                .into_response();
        }
    };

    match message {
        Value::Array(items) if items.is_empty() => {
            let error = JsonRpcError::new(INVALID_REQUEST, "Invalid Request: empty batch");
            Json(JsonRpcResponse::error(None, error)).into_response()
        }
        Value::Array(items) => {
            let mut responses = Vec::with_capacity(items.len());
            for item in items {
                if let Some(response) = handle_message(&state, &ctx, item).await {
                    responses.push(response);
                }
            }
            if responses.is_empty() {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(responses).into_response()
            }
        }
        single => match handle_message(&state, &ctx, single).await {
            Some(response) => Json(response).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        },
    }
}

/// `None` for notifications, which get no response.
async fn handle_message(state: &AppState, ctx: &AuthCtx, message: Value) -> Option<JsonRpcResponse> {
    let id = message
        .get("id")
        .and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok());

    let request = match serde_json::from_value::<JsonRpcRequest>(message) {
        Ok(request) if request.jsonrpc == "2.0" => request,
        _ => {
            let error = JsonRpcError::new(INVALID_REQUEST, "Invalid Request");
            return Some(JsonRpcResponse::error(id, error));
        }
    };

    if request.id.is_none() {
        tracing::debug!(method = %request.method, "notification received");
        return None;
    }

    tracing::debug!(method = %request.method, subject = %ctx.subject, scopes = ?ctx.scopes, "rpc request");
    let response = match dispatch(state, ctx, &request.method, request.params).await {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(error) => JsonRpcResponse::error(request.id, error),
    };
    Some(response)
}

async fn dispatch(
    state: &AppState,
    ctx: &AuthCtx,
    method: &str,
    params: Value,
) -> Result<Value, JsonRpcError> {
    match method {
        "initialize" => {
            let version = params
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_PROTOCOL_VERSION);
            Ok(json!({
                "protocolVersion": version,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }))
        }
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({"tools": ToolService::definitions()})),
        "tools/call" => {
            let params: CallParams = serde_json::from_value(params)
                .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {e}")))?;

            let output = state
                .tools
                .call(&params.name, params.arguments, &ctx.subject)
                .await
                .map_err(|e| tool_error(&params.name, e))?;

            tracing::info!(tool = %params.name, subject = %ctx.subject, "tool call succeeded");
            Ok(json!({
                "content": [{"type": "text", "text": output.to_string()}],
                "structuredContent": output,
                "isError": false,
            }))
        }
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        )),
    }
}

pub(crate) fn tool_error(tool: &str, e: ToolError) -> JsonRpcError {
    match &e {
        ToolError::Internal(detail) => {
            tracing::error!(tool, detail = %detail, "tool call failed");
        }
        _ => tracing::warn!(tool, code = e.code(), error = %e, "tool call rejected"),
    }
    JsonRpcError::new(e.code(), e.to_string()).with_data(e.data())
}
