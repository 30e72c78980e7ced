/*
 * Responsibility
 * - ドメインロジック (auth / tools) の公開インターフェース
 * - outbound HTTP client の生成 (timeout 必須)
 */
use std::time::Duration;

pub mod auth;
pub mod clock;
pub mod tools;

/// Builds an outbound client. Every outbound call in this crate is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}
