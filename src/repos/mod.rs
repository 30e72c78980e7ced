/*
 * Responsibility
 * - SQLite 接続 (pool) の生成
 * - schema の作成 (起動時に冪等に実行)
 * - テーブルごとの repo の公開
 */
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub mod error;
pub mod note_repo;
pub mod profile_repo;
mod schema;
pub mod user_repo;

use error::RepoError;

pub async fn connect(database_url: &str) -> Result<SqlitePool, RepoError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // in-memory databases are per-connection: one connection, never recycled
    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options.connect_with(options).await?;

    schema::create(&pool).await?;
    Ok(pool)
}
