//! `profile` tool: the authenticated user's own profile.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use sqlx::SqlitePool;

use super::ToolError;
use crate::repos::error::RepoError;
use crate::repos::profile_repo::{self, ProfileChanges, ProfileRow};

const ACTIONS: &[&str] = &["get", "create", "update", "delete"];

#[derive(Debug, Default, Deserialize)]
pub struct ProfileArgs {
    pub action: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub preferences: Option<Map<String, Value>>,
}

pub async fn execute(db: &SqlitePool, user_id: &str, args: ProfileArgs) -> Result<Value, ToolError> {
    let action = args.action.trim().to_ascii_lowercase();

    let result = match action.as_str() {
        "get" => match profile_repo::get(db, user_id).await? {
            Some(row) => {
                let mut profile = profile_json(&row)?;
                profile["exists"] = json!(true);
                profile
            }
            None => json!({
                "user_id": user_id,
                "name": null,
                "bio": null,
                "avatar_url": null,
                "preferences": {},
                "exists": false,
            }),
        },
        "create" => {
            let name = args
                .name
                .as_deref()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| ToolError::invalid_params("name is required for create action"))?;
            let preferences = args.preferences.unwrap_or_default();
            let row = profile_repo::create(
                db,
                user_id,
                name,
                args.bio.as_deref(),
                args.avatar_url.as_deref(),
                &preferences,
            )
            .await
            .map_err(|e| match e {
                RepoError::Conflict => {
                    ToolError::invalid_params("Profile already exists. Use update action instead.")
                }
                other => other.into(),
            })?;
            profile_json(&row)?
        }
        "update" => {
            let changes = ProfileChanges {
                name: args.name.as_deref(),
                bio: args.bio.as_deref(),
                avatar_url: args.avatar_url.as_deref(),
                preferences: args.preferences.as_ref(),
            };
            let row = profile_repo::update(db, user_id, changes)
                .await?
                .ok_or_else(|| ToolError::NotFound("Profile not found".into()))?;
            profile_json(&row)?
        }
        "delete" => {
            if !profile_repo::delete(db, user_id).await? {
                return Err(ToolError::NotFound("Profile not found".into()));
            }
            json!({"success": true, "message": "Profile deleted"})
        }
        _ => {
            return Err(ToolError::InvalidParams {
                message: format!("Invalid action: {}", args.action),
                data: Some(json!({"valid_actions": ACTIONS})),
            });
        }
    };

    tracing::info!(action = %action, user_id, "profile action completed");
    Ok(result)
}

fn profile_json(row: &ProfileRow) -> Result<Value, ToolError> {
    Ok(json!({
        "id": row.id,
        "user_id": row.user_id,
        "name": row.name,
        "bio": row.bio,
        "avatar_url": row.avatar_url,
        "preferences": row.preference_map()?,
        "created_at": row.created_at.to_rfc3339(),
        "updated_at": row.updated_at.to_rfc3339(),
        "version": row.version,
    }))
}
