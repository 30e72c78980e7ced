use sqlx::SqlitePool;

use crate::repos::error::RepoError;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     TEXT    NOT NULL UNIQUE,
        email       TEXT,
        username    TEXT,
        is_active   INTEGER NOT NULL DEFAULT 1,
        last_login  TEXT,
        created_at  TEXT    NOT NULL,
        updated_at  TEXT    NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_profiles (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     TEXT    NOT NULL UNIQUE REFERENCES users(user_id) ON DELETE CASCADE,
        name        TEXT,
        bio         TEXT,
        avatar_url  TEXT,
        preferences TEXT    NOT NULL DEFAULT '{}',
        version     INTEGER NOT NULL DEFAULT 1,
        created_at  TEXT    NOT NULL,
        updated_at  TEXT    NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_notes (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     TEXT    NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
        title       TEXT,
        content     TEXT    NOT NULL,
        tags        TEXT    NOT NULL DEFAULT '[]',
        is_pinned   INTEGER NOT NULL DEFAULT 0,
        is_archived INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT    NOT NULL,
        updated_at  TEXT    NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_user_notes_user_id ON user_notes(user_id)",
];

pub async fn create(db: &SqlitePool) -> Result<(), RepoError> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(db).await?;
    }
    Ok(())
}
