/*
 * Responsibility
 * - URL 構造を定義 (/health, /mcp, /stream/...)
 * - auth の適用範囲は middleware::auth 側 (exempt path で判定)
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::handlers::{health::health, rpc::mcp, stream};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/mcp", post(mcp))
        .route("/stream/file", get(stream::file))
        .route("/stream/weather", get(stream::weather))
}
