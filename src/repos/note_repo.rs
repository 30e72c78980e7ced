/*
 * Responsibility
 * - user_notes テーブル向け SQLx 操作
 * - すべての操作は (id, user_id) で絞る: 他人の note は「存在しない」と同じ扱い
 * - tags は JSON 配列の TEXT として保存
 */
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::repos::error::RepoError;

#[derive(Debug, Clone, FromRow)]
pub struct NoteRow {
    pub id: i64,
    pub user_id: String,
    pub title: Option<String>,
    pub content: String,
    pub tags: String,
    pub is_pinned: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NoteRow {
    pub fn tag_list(&self) -> Result<Vec<String>, RepoError> {
        Ok(serde_json::from_str(&self.tags)?)
    }
}

#[derive(Debug, Default)]
pub struct NoteChanges<'a> {
    pub title: Option<&'a str>,
    pub content: Option<&'a str>,
    pub tags: Option<&'a [String]>,
    pub is_pinned: Option<bool>,
    pub is_archived: Option<bool>,
}

const COLUMNS: &str =
    "id, user_id, title, content, tags, is_pinned, is_archived, created_at, updated_at";

pub async fn create(
    db: &SqlitePool,
    user_id: &str,
    title: Option<&str>,
    content: &str,
    tags: &[String],
    is_pinned: bool,
) -> Result<NoteRow, RepoError> {
    let now = Utc::now();
    let sql = format!(
        r#"
        INSERT INTO user_notes (user_id, title, content, tags, is_pinned, is_archived, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
        RETURNING {COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, NoteRow>(&sql)
        .bind(user_id)
        .bind(title)
        .bind(content)
        .bind(serde_json::to_string(tags)?)
        .bind(is_pinned)
        .bind(now)
        .fetch_one(db)
        .await?;

    Ok(row)
}

pub async fn get(db: &SqlitePool, id: i64, user_id: &str) -> Result<Option<NoteRow>, RepoError> {
    let sql = format!("SELECT {COLUMNS} FROM user_notes WHERE id = ?1 AND user_id = ?2");
    let row = sqlx::query_as::<_, NoteRow>(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

    Ok(row)
}

/// Pinned first, then newest first.
pub async fn list(
    db: &SqlitePool,
    user_id: &str,
    include_archived: bool,
    tag: Option<&str>,
) -> Result<Vec<NoteRow>, RepoError> {
    let sql = format!(
        r#"
        SELECT {COLUMNS}
        FROM user_notes
        WHERE user_id = ?1
          AND (?2 OR is_archived = 0)
          AND (?3 IS NULL OR EXISTS (
                SELECT 1 FROM json_each(user_notes.tags) WHERE json_each.value = ?3
          ))
        ORDER BY is_pinned DESC, created_at DESC, id DESC
        "#
    );
    let rows = sqlx::query_as::<_, NoteRow>(&sql)
        .bind(user_id)
        .bind(include_archived)
        .bind(tag)
        .fetch_all(db)
        .await?;

    Ok(rows)
}

pub async fn update(
    db: &SqlitePool,
    id: i64,
    user_id: &str,
    changes: NoteChanges<'_>,
) -> Result<Option<NoteRow>, RepoError> {
    // None -> keep the current value
    let tags = changes.tags.map(|t| serde_json::to_string(t)).transpose()?;
    let sql = format!(
        r#"
        UPDATE user_notes
        SET
            title       = COALESCE(?3, title),
            content     = COALESCE(?4, content),
            tags        = COALESCE(?5, tags),
            is_pinned   = COALESCE(?6, is_pinned),
            is_archived = COALESCE(?7, is_archived),
            updated_at  = ?8
        WHERE id = ?1 AND user_id = ?2
        RETURNING {COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, NoteRow>(&sql)
        .bind(id)
        .bind(user_id)
        .bind(changes.title)
        .bind(changes.content)
        .bind(tags)
        .bind(changes.is_pinned)
        .bind(changes.is_archived)
        .bind(Utc::now())
        .fetch_optional(db)
        .await?;

    Ok(row)
}

pub async fn delete(db: &SqlitePool, id: i64, user_id: &str) -> Result<bool, RepoError> {
    let result = sqlx::query("DELETE FROM user_notes WHERE id = ?1 AND user_id = ?2")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}
