/*
 * Responsibility
 * - users テーブル向け SQLx 操作
 * - user_id は token の sub (IdP 側の識別子) をそのまま使う
 */
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::repos::error::RepoError;

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creates the user on first sight, otherwise bumps `last_login`.
pub async fn touch_login(db: &SqlitePool, user_id: &str) -> Result<UserRow, RepoError> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (user_id, is_active, last_login, created_at, updated_at)
        VALUES (?1, 1, ?2, ?2, ?2)
        ON CONFLICT(user_id) DO UPDATE SET last_login = excluded.last_login
        RETURNING id, user_id, email, username, is_active, last_login, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(db)
    .await?;

    Ok(row)
}
