use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;

use crate::repos::error::RepoError;

/// Tool failures. Each variant owns a JSON-RPC error code; the message is
/// safe to show to the caller.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{message}")]
    InvalidParams { message: String, data: Option<Value> },

    #[error("{0}")]
    NotFound(String),

    #[error("Path not in allowlist: {path}")]
    PathNotAllowed {
        path: String,
        reason: String,
        allowed: Vec<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: cannot {operation} {path}")]
    PermissionDenied {
        path: String,
        operation: &'static str,
    },

    #[error("File too large: {size_bytes} bytes (max: {max_bytes} bytes)")]
    FileTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("Invalid file extension: {extension}")]
    InvalidExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("Disk full: {0}")]
    DiskFull(String),

    #[error("Invalid city name: {city} ({reason})")]
    InvalidCity { city: String, reason: &'static str },

    #[error("City not found: {0}")]
    CityNotFound(String),

    #[error("{api} API timeout after {seconds} seconds")]
    ApiTimeout { api: &'static str, seconds: u64 },

    #[error("{api} API rate limit exceeded{}", retry_suffix(.retry_after))]
    ApiRateLimit {
        api: &'static str,
        retry_after: Option<u64>,
    },

    #[error("{api} API authentication failed")]
    ApiAuthentication { api: &'static str },

    #[error("{0}")]
    Network(String),

    // detail stays in the logs
    #[error("Internal error")]
    Internal(String),
}

fn retry_suffix(retry_after: &Option<u64>) -> String {
    retry_after
        .map(|s| format!(" (retry after {s}s)"))
        .unwrap_or_default()
}

impl ToolError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
            data: None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ToolError::InvalidParams { .. } => -32602,
            ToolError::Internal(_) => -32603,
            ToolError::NotFound(_) => -32001,
            ToolError::PathNotAllowed { .. } => -32002,
            ToolError::FileNotFound(_) => -32003,
            ToolError::PermissionDenied { .. } => -32004,
            ToolError::FileTooLarge { .. } => -32005,
            ToolError::InvalidExtension { .. } => -32006,
            ToolError::DiskFull(_) => -32007,
            ToolError::InvalidCity { .. } => -32008,
            ToolError::CityNotFound(_) => -32009,
            ToolError::ApiTimeout { .. } => -32010,
            ToolError::ApiRateLimit { .. } => -32011,
            ToolError::ApiAuthentication { .. } => -32012,
            ToolError::Network(_) => -32013,
        }
    }

    /// Structured `data` for the JSON-RPC error object. Always carries a timestamp.
    pub fn data(&self) -> Value {
        let mut data = match self {
            ToolError::InvalidParams { data: Some(Value::Object(map)), .. } => map.clone(),
            ToolError::PathNotAllowed {
                path,
                reason,
                allowed,
            } => object(json!({"path": path, "reason": reason, "allowed_directories": allowed})),
            ToolError::FileNotFound(path) => object(json!({"filepath": path})),
            ToolError::PermissionDenied { path, operation } => {
                object(json!({"filepath": path, "operation": operation}))
            }
            ToolError::FileTooLarge {
                size_bytes,
                max_bytes,
            } => object(json!({
                "size_bytes": size_bytes,
                "max_size_bytes": max_bytes,
                "size_mb": round2(*size_bytes as f64 / (1024.0 * 1024.0)),
                "max_size_mb": round2(*max_bytes as f64 / (1024.0 * 1024.0)),
            })),
            ToolError::InvalidExtension { extension, allowed } => {
                object(json!({"extension": extension, "allowed_extensions": allowed}))
            }
            ToolError::InvalidCity { city, reason } => object(json!({"city": city, "reason": reason})),
            ToolError::CityNotFound(city) => object(json!({"city": city})),
            ToolError::ApiTimeout { api, seconds } => {
                object(json!({"api": api, "timeout_seconds": seconds}))
            }
            ToolError::ApiRateLimit { api, retry_after } => {
                let mut m = object(json!({"api": api}));
                if let Some(secs) = retry_after {
                    m.insert("retry_after_seconds".into(), json!(secs));
                }
                m
            }
            ToolError::ApiAuthentication { api } => object(json!({"api": api})),
            _ => serde_json::Map::new(),
        };
        data.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
        Value::Object(data)
    }
}

fn object(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl From<RepoError> for ToolError {
    fn from(e: RepoError) -> Self {
        tracing::error!(error = ?e, "repository error in tool");
        ToolError::Internal(e.to_string())
    }
}
