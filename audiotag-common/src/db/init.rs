//! WAL-journaled SQLite pool construction, shared by every persistent cache.

use crate::error::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if absent) a SQLite database with WAL journaling enabled,
/// per spec.md §4.2/§6. Callers run their own `CREATE TABLE IF NOT EXISTS`
/// statements against the returned pool.
pub async fn open_wal_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await?;

    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;

    Ok(pool)
}
