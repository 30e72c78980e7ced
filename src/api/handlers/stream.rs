/*
 * Responsibility
 * - GET /stream/file, /stream/weather: tool 実行の進捗を SSE で返す
 * - event の並び: status → progress (validation / execution / processing) → complete | error
 * - 認証は /mcp と同じ middleware (query の ?token= fallback は /stream/ 配下のみ)
 */
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::extractors::AuthCtxExtractor;
use crate::api::handlers::rpc::tool_error;
use crate::services::tools::ToolService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    operation: String,
    filepath: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    city: String,
}

pub async fn file(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Query(query): Query<FileQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut arguments = json!({"operation": query.operation, "filepath": query.filepath});
    if let Some(content) = query.content {
        arguments["content"] = Value::String(content);
    }
    tracing::info!(subject = %ctx.subject, tool = "file_operations", "streaming tool call");
    progress(state.tools.clone(), "file_operations", arguments, ctx.subject)
}

pub async fn weather(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Query(query): Query<WeatherQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(subject = %ctx.subject, tool = "weather", city = %query.city, "streaming tool call");
    progress(state.tools.clone(), "weather", json!({"city": query.city}), ctx.subject)
}

// Owned arguments only: the returned stream outlives the handler.
fn progress(
    tools: Arc<ToolService>,
    tool: &'static str,
    arguments: Value,
    subject: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream! {
        let started = Instant::now();

        yield Ok(event("status", json!({
            "status": "starting",
            "message": format!("Starting {tool} execution"),
            "metadata": {"params": arguments},
        })));
        yield Ok(step("validation", 10, "Validating input parameters".into()));
        yield Ok(step("execution", 50, format!("Executing {tool} operation")));

        match tools.call(tool, arguments, &subject).await {
            Ok(result) => {
                yield Ok(step("processing", 90, "Processing results".into()));
                yield Ok(event("complete", json!({
                    "success": true,
                    "result": result,
                    "duration_ms": started.elapsed().as_secs_f64() * 1000.0,
                    "completed_at": Utc::now().to_rfc3339(),
                })));
            }
            Err(e) => {
                let error = tool_error(tool, e);
                yield Ok(Event::default()
                    .event("error")
                    .data(serde_json::to_string(&error).unwrap_or_default()));
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn step(stage: &str, percent: u8, message: String) -> Event {
    event(
        "progress",
        json!({"stage": stage, "progress": percent, "message": message}),
    )
}

fn event(name: &str, data: Value) -> Event {
    Event::default().event(name).data(data.to_string())
}
