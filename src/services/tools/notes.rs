//! `notes` tool: per-user notes. The owner is always the authenticated subject.

use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;

use super::ToolError;
use crate::repos::note_repo::{self, NoteChanges, NoteRow};

const ACTIONS: &[&str] = &[
    "create", "get", "list", "update", "delete", "archive", "unarchive", "pin", "unpin",
];

#[derive(Debug, Default, Deserialize)]
pub struct NotesArgs {
    pub action: String,
    #[serde(default)]
    pub note_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default)]
    pub tag: Option<String>,
}

pub async fn execute(db: &SqlitePool, user_id: &str, args: NotesArgs) -> Result<Value, ToolError> {
    let action = args.action.trim().to_ascii_lowercase();

    let result = match action.as_str() {
        "create" => {
            let content = args
                .content
                .as_deref()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| ToolError::invalid_params("content is required for create action"))?;
            let tags = args.tags.unwrap_or_default();
            let row = note_repo::create(
                db,
                user_id,
                args.title.as_deref(),
                content,
                &tags,
                args.is_pinned.unwrap_or(false),
            )
            .await?;
            note_json(&row)?
        }
        "list" => {
            let rows = note_repo::list(db, user_id, args.include_archived, args.tag.as_deref()).await?;
            let notes = rows.iter().map(note_json).collect::<Result<Vec<_>, _>>()?;
            json!({"count": notes.len(), "notes": notes})
        }
        "get" => {
            let id = require_id(&action, args.note_id)?;
            let row = note_repo::get(db, id, user_id).await?.ok_or_else(|| not_found(id))?;
            note_json(&row)?
        }
        "delete" => {
            let id = require_id(&action, args.note_id)?;
            if !note_repo::delete(db, id, user_id).await? {
                return Err(not_found(id));
            }
            json!({"success": true, "message": format!("Note {id} deleted")})
        }
        "update" | "archive" | "unarchive" | "pin" | "unpin" => {
            let id = require_id(&action, args.note_id)?;
            let changes = match action.as_str() {
                "archive" => NoteChanges { is_archived: Some(true), ..Default::default() },
                "unarchive" => NoteChanges { is_archived: Some(false), ..Default::default() },
                "pin" => NoteChanges { is_pinned: Some(true), ..Default::default() },
                "unpin" => NoteChanges { is_pinned: Some(false), ..Default::default() },
                _ => NoteChanges {
                    title: args.title.as_deref(),
                    content: args.content.as_deref(),
                    tags: args.tags.as_deref(),
                    is_pinned: args.is_pinned,
                    is_archived: None,
                },
            };
            let row = note_repo::update(db, id, user_id, changes)
                .await?
                .ok_or_else(|| not_found(id))?;
            note_json(&row)?
        }
        _ => {
            return Err(ToolError::InvalidParams {
                message: format!("Invalid action: {}", args.action),
                data: Some(json!({"valid_actions": ACTIONS})),
            });
        }
    };

    tracing::info!(action = %action, user_id, "notes action completed");
    Ok(result)
}

fn require_id(action: &str, note_id: Option<i64>) -> Result<i64, ToolError> {
    note_id.ok_or_else(|| ToolError::invalid_params(format!("note_id is required for {action} action")))
}

fn not_found(id: i64) -> ToolError {
    ToolError::NotFound(format!("Note {id} not found or access denied"))
}

fn note_json(row: &NoteRow) -> Result<Value, ToolError> {
    Ok(json!({
        "id": row.id,
        "user_id": row.user_id,
        "title": row.title,
        "content": row.content,
        "tags": row.tag_list()?,
        "is_pinned": row.is_pinned,
        "is_archived": row.is_archived,
        "created_at": row.created_at.to_rfc3339(),
        "updated_at": row.updated_at.to_rfc3339(),
    }))
}
