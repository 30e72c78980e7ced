/*
 * Responsibility
 * - MCP tool の登録 (名前 / 説明 / inputSchema)
 * - tools/call の dispatch と引数の decode
 * - user スコープの tool は呼び出し前に users 行を touch する
 */
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::repos::user_repo;

mod error;
pub mod file_operations;
pub mod notes;
pub mod profile;
pub mod weather;

pub use error::ToolError;
use file_operations::FileOperations;
use weather::WeatherClient;

#[derive(Debug)]
pub struct ToolService {
    db: SqlitePool,
    files: FileOperations,
    weather: WeatherClient,
}

impl ToolService {
    pub fn new(db: SqlitePool, files: FileOperations, weather: WeatherClient) -> Self {
        Self { db, files, weather }
    }

    /// `tools/list` payload.
    pub fn definitions() -> Value {
        json!([
            {
                "name": "file_operations",
                "description": "Read or write UTF-8 text files inside the allowed directories.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "operation": {"type": "string", "enum": ["read", "write"]},
                        "filepath": {"type": "string"},
                        "content": {"type": "string", "description": "required for write"}
                    },
                    "required": ["operation", "filepath"]
                }
            },
            {
                "name": "weather",
                "description": "Current weather for a city.",
                "inputSchema": {
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                }
            },
            {
                "name": "notes",
                "description": "Create, list and manage the caller's notes.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ["create", "get", "list", "update", "delete",
                                     "archive", "unarchive", "pin", "unpin"]
                        },
                        "note_id": {"type": "integer"},
                        "title": {"type": "string"},
                        "content": {"type": "string"},
                        "tags": {"type": "array", "items": {"type": "string"}},
                        "is_pinned": {"type": "boolean"},
                        "include_archived": {"type": "boolean"},
                        "tag": {"type": "string"}
                    },
                    "required": ["action"]
                }
            },
            {
                "name": "profile",
                "description": "Read and manage the caller's profile.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "action": {"type": "string", "enum": ["get", "create", "update", "delete"]},
                        "name": {"type": "string"},
                        "bio": {"type": "string"},
                        "avatar_url": {"type": "string"},
                        "preferences": {"type": "object"}
                    },
                    "required": ["action"]
                }
            }
        ])
    }

    pub async fn call(&self, name: &str, arguments: Value, subject: &str) -> Result<Value, ToolError> {
        match name {
            "file_operations" => self.files.execute(decode(name, arguments)?).await,
            "weather" => self.weather.current(decode(name, arguments)?).await,
            "notes" => {
                let args = decode(name, arguments)?;
                user_repo::touch_login(&self.db, subject).await?;
                notes::execute(&self.db, subject, args).await
            }
            "profile" => {
                let args = decode(name, arguments)?;
                user_repo::touch_login(&self.db, subject).await?;
                profile::execute(&self.db, subject, args).await
            }
            other => Err(ToolError::invalid_params(format!("Unknown tool: {other}"))),
        }
    }
}

fn decode<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ToolError> {
    // a missing `arguments` member arrives as null
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidParams {
        message: format!("Invalid arguments for {tool}: {e}"),
        data: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_name_every_tool() {
        let defs = ToolService::definitions();
        let names: Vec<_> = defs
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["file_operations", "weather", "notes", "profile"]);
    }

    #[test]
    fn decode_reports_bad_arguments_as_invalid_params() {
        let err = decode::<notes::NotesArgs>("notes", json!({"note_id": 3})).unwrap_err();
        assert_eq!(err.code(), -32602);
        assert!(err.to_string().starts_with("Invalid arguments for notes"));

        let args: notes::NotesArgs = decode("notes", json!({"action": "list"})).unwrap();
        assert_eq!(args.action, "list");
    }
}
