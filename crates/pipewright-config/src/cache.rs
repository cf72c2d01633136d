//! In-process configuration value cache
//!
//! Owned by a manager instance, never shared process-wide. Entries are
//! invalidated on write or delete of their key before the operation
//! completes, so readers never observe values stale relative to a write
//! the cache has seen.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::types::Environment;

type CacheKey = (String, Option<Environment>);

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Value cache keyed by `(key, environment)`
pub struct ValueCache {
    entries: RwLock<HashMap<CacheKey, Value>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ValueCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &str, environment: Option<Environment>) -> Option<Value> {
        let entries = self.entries.read().await;
        match entries.get(&(key.to_string(), environment)) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::SeqCst);
                Some(value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    pub async fn insert(&self, key: &str, environment: Option<Environment>, value: Value) {
        let mut entries = self.entries.write().await;
        entries.insert((key.to_string(), environment), value);
    }

    pub async fn invalidate(&self, key: &str, environment: Option<Environment>) {
        let mut entries = self.entries.write().await;
        entries.remove(&(key.to_string(), environment));
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            hits: self.hits.load(Ordering::SeqCst),
            misses: self.misses.load(Ordering::SeqCst),
        }
    }
}

impl Default for ValueCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_hit_and_miss_accounting() {
        let cache = ValueCache::new();
        assert_eq!(cache.get("k", None).await, None);
        cache.insert("k", None, json!(1)).await;
        assert_eq!(cache.get("k", None).await, Some(json!(1)));

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_environment_scopes_are_distinct_entries() {
        let cache = ValueCache::new();
        cache.insert("k", None, json!("global")).await;
        cache
            .insert("k", Some(Environment::Production), json!("prod"))
            .await;

        cache.invalidate("k", Some(Environment::Production)).await;
        assert_eq!(cache.get("k", None).await, Some(json!("global")));
        assert_eq!(cache.get("k", Some(Environment::Production)).await, None);
    }
}
