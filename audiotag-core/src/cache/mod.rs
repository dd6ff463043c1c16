//! Three logical key-value stores (spec.md §4.2): fingerprint → match
//! list, recording-id → metadata record, artist+title → lyrics. Each is
//! backed by either an in-memory map or the shared persistent database,
//! selected once at orchestrator construction (`AppSettings.usePersistentCache`).

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use async_trait::async_trait;
use audiotag_common::error::Result;
use serde::{de::DeserializeOwned, Serialize};

/// A single logical cache. `put`/`get` carry `Option<V>` so that a
/// "not found" result can itself be cached (avoiding repeat queries
/// against a dead lookup), distinct from a genuine cache miss.
#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// `None` = cache miss (key never stored). `Some(None)` = a cached
    /// negative result. `Some(Some(v))` = a cached positive result.
    async fn get(&self, key: &str) -> Result<Option<Option<V>>>;
    async fn put(&self, key: &str, value: Option<V>) -> Result<()>;
    async fn has(&self, key: &str) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    async fn size(&self) -> Result<usize>;
}

/// Aggregate counters exposed over the orchestrator surface (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub fingerprints: usize,
    pub metadata: usize,
    pub lyrics: usize,
    pub total_entries: usize,
    pub size_bytes: u64,
    pub is_persistent: bool,
}

/// Normalises a cache lookup key per spec.md §3: `lower(trim(artist)) + "|" + lower(trim(title))`.
pub fn lyrics_key(artist: &str, title: &str) -> String {
    format!(
        "{}|{}",
        artist.trim().to_lowercase(),
        title.trim().to_lowercase()
    )
}

use crate::types::{CanonicalMetadata, FingerprintResult};
use std::sync::Arc;

/// The three caches the orchestrator wires up, behind whichever backend
/// `AppSettings.usePersistentCache` selected at construction.
pub struct CacheBundle {
    pub fingerprints: Arc<dyn Cache<Vec<FingerprintResult>>>,
    pub metadata: Arc<dyn Cache<CanonicalMetadata>>,
    pub lyrics: Arc<dyn Cache<String>>,
    is_persistent: bool,
    pool: Option<sqlx::SqlitePool>,
}

impl CacheBundle {
    pub fn in_memory() -> Self {
        Self {
            fingerprints: Arc::new(MemoryCache::new()),
            metadata: Arc::new(MemoryCache::new()),
            lyrics: Arc::new(MemoryCache::new()),
            is_persistent: false,
            pool: None,
        }
    }

    pub async fn persistent(db_path: &std::path::Path) -> Result<Self> {
        let pool = audiotag_common::db::open_wal_pool(db_path).await?;
        Ok(Self {
            fingerprints: Arc::new(SqliteCache::new(pool.clone(), "fingerprints").await?),
            metadata: Arc::new(SqliteCache::new(pool.clone(), "metadata").await?),
            lyrics: Arc::new(SqliteCache::new(pool.clone(), "lyrics").await?),
            is_persistent: true,
            pool: Some(pool),
        })
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let fingerprints = self.fingerprints.size().await?;
        let metadata = self.metadata.size().await?;
        let lyrics = self.lyrics.size().await?;
        let size_bytes = match &self.pool {
            Some(_) => self.size_bytes().await.unwrap_or(0),
            None => 0,
        };
        Ok(CacheStats {
            fingerprints,
            metadata,
            lyrics,
            total_entries: fingerprints + metadata + lyrics,
            size_bytes,
            is_persistent: self.is_persistent,
        })
    }

    async fn size_bytes(&self) -> Result<u64> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };
        let row: (i64, i64) = sqlx::query_as(
            "SELECT page_count, page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(pool)
        .await?;
        Ok((row.0 * row.1) as u64)
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.fingerprints.clear().await?;
        self.metadata.clear().await?;
        self.lyrics.clear().await?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lyrics_key_normalises_case_and_whitespace() {
        assert_eq!(lyrics_key("  Queen ", "Bohemian Rhapsody"), "queen|bohemian rhapsody");
        assert_eq!(lyrics_key("queen", "BOHEMIAN RHAPSODY"), lyrics_key("Queen", "Bohemian Rhapsody"));
    }
}
