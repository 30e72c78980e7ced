/*
 * Responsibility
 * - HTTP 境界で返すエラー (AppError) の定義
 * - IntoResponse 実装 (status / {"error", "message"} の JSON body)
 * - AuthError をここで一度だけ HTTP 表現に落とす (tool の失敗は JSON-RPC error 側)
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::auth::AuthError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized(message) => {
                let body = ErrorResponse {
                    error: "unauthorized",
                    message: message.to_string(),
                };
                let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
        }
    }
}

// 内部の詳細 (kid, upstream status など) はログにだけ出し、クライアントには種別だけ返す
impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::TokenExpired => AppError::Unauthorized("Token has expired"),
            AuthError::InvalidToken(_) => AppError::Unauthorized("Invalid token"),
            AuthError::JwksFetch(_) => AppError::Unauthorized("Unable to validate token"),
            AuthError::Authentication(_) => AppError::Unauthorized("Authentication failed"),
        }
    }
}
