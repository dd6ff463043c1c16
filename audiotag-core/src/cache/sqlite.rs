//! Persistent cache backend: one table per logical store in the shared
//! `cache.db`, WAL-journaled (spec.md §4.2, §6).

use super::Cache;
use crate::utils::retry_on_lock;
use async_trait::async_trait;
use audiotag_common::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{Row, SqlitePool};
use std::marker::PhantomData;

const MAX_LOCK_WAIT_MS: u64 = 2_000;

pub struct SqliteCache<V> {
    pool: SqlitePool,
    table: &'static str,
    _marker: PhantomData<V>,
}

impl<V> SqliteCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// `table` must be one of `"fingerprints"`, `"metadata"`, `"lyrics"`.
    pub async fn new(pool: SqlitePool, table: &'static str) -> Result<Self> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                key TEXT PRIMARY KEY,
                value TEXT,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )"
        );
        sqlx::query(&ddl).execute(&pool).await?;
        Ok(Self {
            pool,
            table,
            _marker: PhantomData,
        })
    }
}

#[async_trait]
impl<V> Cache<V> for SqliteCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<Option<Option<V>>> {
        let query = format!("SELECT value FROM {} WHERE key = ?", self.table);
        let row = sqlx::query(&query).bind(key).fetch_optional(&self.pool).await?;
        Ok(row.map(|row| {
            let raw: Option<String> = row.get("value");
            raw.and_then(|s| serde_json::from_str(&s).ok())
        }))
    }

    async fn put(&self, key: &str, value: Option<V>) -> Result<()> {
        let json = value
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| audiotag_common::error::Error::Internal(e.to_string()))?;

        let table = self.table;
        retry_on_lock("cache put", MAX_LOCK_WAIT_MS, || {
            let pool = self.pool.clone();
            let json = json.clone();
            let key = key.to_string();
            async move {
                let query = format!(
                    "INSERT INTO {table} (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"
                );
                sqlx::query(&query).bind(&key).bind(&json).execute(&pool).await?;
                Ok(())
            }
        })
        .await
    }

    async fn has(&self, key: &str) -> Result<bool> {
        let query = format!("SELECT 1 FROM {} WHERE key = ?", self.table);
        let row = sqlx::query(&query).bind(key).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let query = format!("DELETE FROM {} WHERE key = ?", self.table);
        sqlx::query(&query).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let query = format!("DELETE FROM {}", self.table);
        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        let query = format!("SELECT COUNT(*) as c FROM {}", self.table);
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        let count: i64 = row.get("c");
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiotag_common::db::open_wal_pool;

    async fn pool() -> SqlitePool {
        let dir = tempfile::tempdir().unwrap();
        open_wal_pool(&dir.path().join("cache.db")).await.unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache: SqliteCache<String> = SqliteCache::new(pool().await, "fingerprints").await.unwrap();
        cache.put("abc123", Some("hello".to_string())).await.unwrap();
        assert_eq!(cache.get("abc123").await.unwrap(), Some(Some("hello".to_string())));
    }

    #[tokio::test]
    async fn caches_negative_results_distinctly_from_miss() {
        let cache: SqliteCache<String> = SqliteCache::new(pool().await, "metadata").await.unwrap();
        assert_eq!(cache.get("nope").await.unwrap(), None);
        cache.put("nope", None).await.unwrap();
        assert_eq!(cache.get("nope").await.unwrap(), Some(None));
        assert!(cache.has("nope").await.unwrap());
    }

    #[tokio::test]
    async fn size_and_clear() {
        let cache: SqliteCache<String> = SqliteCache::new(pool().await, "lyrics").await.unwrap();
        cache.put("a", Some("x".into())).await.unwrap();
        cache.put("b", Some("y".into())).await.unwrap();
        assert_eq!(cache.size().await.unwrap(), 2);
        cache.clear().await.unwrap();
        assert_eq!(cache.size().await.unwrap(), 0);
    }
}
