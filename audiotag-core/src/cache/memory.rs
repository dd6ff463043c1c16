//! In-memory cache backend: a keyed hash map behind a `RwLock` so
//! concurrent reads don't block each other and concurrent keys never
//! contend for the same lock slot in practice.

use super::Cache;
use async_trait::async_trait;
use audiotag_common::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct MemoryCache<V> {
    entries: RwLock<HashMap<String, Option<V>>>,
}

impl<V> MemoryCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> Cache<V> for MemoryCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    async fn get(&self, key: &str) -> Result<Option<Option<V>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Option<V>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache: MemoryCache<String> = MemoryCache::new();
        cache.put("k", Some("v".to_string())).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(Some("v".to_string())));
    }

    #[tokio::test]
    async fn caches_negative_results() {
        let cache: MemoryCache<String> = MemoryCache::new();
        cache.put("k", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(None));
        assert!(cache.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn miss_is_distinct_from_cached_negative() {
        let cache: MemoryCache<String> = MemoryCache::new();
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }
}
