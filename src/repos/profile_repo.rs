/*
 * Responsibility
 * - user_profiles テーブル向け SQLx 操作
 * - preferences は JSON object の TEXT。update は shallow merge + version++
 */
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{FromRow, SqlitePool};

use crate::repos::error::RepoError;

#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub user_id: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub preferences: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRow {
    pub fn preference_map(&self) -> Result<Map<String, Value>, RepoError> {
        Ok(serde_json::from_str(&self.preferences)?)
    }
}

#[derive(Debug, Default)]
pub struct ProfileChanges<'a> {
    pub name: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub preferences: Option<&'a Map<String, Value>>,
}

const COLUMNS: &str =
    "id, user_id, name, bio, avatar_url, preferences, version, created_at, updated_at";

pub async fn get(db: &SqlitePool, user_id: &str) -> Result<Option<ProfileRow>, RepoError> {
    let sql = format!("SELECT {COLUMNS} FROM user_profiles WHERE user_id = ?1");
    let row = sqlx::query_as::<_, ProfileRow>(&sql)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

    Ok(row)
}

/// Fails with `RepoError::Conflict` if the user already has a profile.
pub async fn create(
    db: &SqlitePool,
    user_id: &str,
    name: &str,
    bio: Option<&str>,
    avatar_url: Option<&str>,
    preferences: &Map<String, Value>,
) -> Result<ProfileRow, RepoError> {
    let sql = format!(
        r#"
        INSERT INTO user_profiles (user_id, name, bio, avatar_url, preferences, version, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
        RETURNING {COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, ProfileRow>(&sql)
        .bind(user_id)
        .bind(name)
        .bind(bio)
        .bind(avatar_url)
        .bind(serde_json::to_string(preferences)?)
        .bind(Utc::now())
        .fetch_one(db)
        .await
        .map_err(RepoError::from_sqlx)?;

    Ok(row)
}

pub async fn update(
    db: &SqlitePool,
    user_id: &str,
    changes: ProfileChanges<'_>,
) -> Result<Option<ProfileRow>, RepoError> {
    // read-merge-write in one transaction so concurrent merges do not drop keys
    let mut tx = db.begin().await?;

    let sql = format!("SELECT {COLUMNS} FROM user_profiles WHERE user_id = ?1");
    let Some(current) = sqlx::query_as::<_, ProfileRow>(&sql)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
    else {
        return Ok(None);
    };

    let preferences = match changes.preferences {
        Some(incoming) => {
            let mut merged = current.preference_map()?;
            for (key, value) in incoming {
                merged.insert(key.clone(), value.clone());
            }
            Some(serde_json::to_string(&merged)?)
        }
        None => None,
    };

    let sql = format!(
        r#"
        UPDATE user_profiles
        SET
            name        = COALESCE(?2, name),
            bio         = COALESCE(?3, bio),
            avatar_url  = COALESCE(?4, avatar_url),
            preferences = COALESCE(?5, preferences),
            version     = version + 1,
            updated_at  = ?6
        WHERE user_id = ?1
        RETURNING {COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, ProfileRow>(&sql)
        .bind(user_id)
        .bind(changes.name)
        .bind(changes.bio)
        .bind(changes.avatar_url)
        .bind(preferences)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(row))
}

pub async fn delete(db: &SqlitePool, user_id: &str) -> Result<bool, RepoError> {
    let result = sqlx::query("DELETE FROM user_profiles WHERE user_id = ?1")
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}
