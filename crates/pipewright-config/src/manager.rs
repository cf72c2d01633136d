//! Configuration manager
//!
//! Orchestrates validation, storage, versioning, cache invalidation and
//! change propagation. Writes to the same key are serialized by a per-key
//! lock; writes to different keys proceed in parallel. Change delivery to
//! watchers and the sink is fire-and-forget relative to the write.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    cache::{CacheStats, ValueCache},
    error::{ConfigError, Result},
    store::ConfigStore,
    types::{ChangeSink, ConfigChange, ConfigHistory, ConfigVersion, Environment, ValidationReport},
    validation,
    versioning::VersionManager,
};

/// Handler invoked with every matching configuration change
pub type WatchHandler = Arc<dyn Fn(ConfigChange) + Send + Sync>;

struct Watcher {
    pattern: String,
    handler: WatchHandler,
}

/// Environment-aware configuration manager
///
/// Pipeline per write: validate, persist through the store, record a
/// version, invalidate the cached entry, then notify watchers and the
/// optional change sink asynchronously.
pub struct ConfigManager {
    store: Arc<dyn ConfigStore>,
    versions: VersionManager,
    cache: ValueCache,
    watchers: RwLock<Vec<Watcher>>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    sink: Option<Arc<dyn ChangeSink>>,
    source: String,
}

impl ConfigManager {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            versions: VersionManager::new(),
            cache: ValueCache::new(),
            watchers: RwLock::new(Vec::new()),
            key_locks: DashMap::new(),
            sink: None,
            source: "config-manager".to_string(),
        }
    }

    /// Bound the per-key version history
    pub fn with_max_versions(mut self, max_versions: usize) -> Self {
        self.versions.set_max_versions(max_versions);
        self
    }

    /// Persist version history as `versions.json` under `dir`
    ///
    /// Without this, history lives only in memory and is lost when the
    /// manager is dropped.
    pub fn with_version_log(mut self, dir: impl Into<PathBuf>) -> Self {
        self.versions.set_log_path(dir.into().join("versions.json"));
        self
    }

    /// Attach a sink that receives every change (e.g. a notifier)
    pub fn with_change_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Label changes originating from this manager
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Set a configuration value
    ///
    /// Fails with a validation error before any state changes; on success
    /// performs exactly one store write and returns the recorded version.
    pub async fn set_configuration(
        &self,
        key: &str,
        value: Value,
        environment: Option<Environment>,
    ) -> Result<ConfigVersion> {
        let report = validation::validate_value(key, &value, environment);
        if !report.valid {
            return Err(ConfigError::Validation {
                message: report.errors.join("; "),
            });
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let old_value = self.current_value(key, environment).await?;
        self.store
            .write(key, value.clone(), environment)
            .await
            .map_err(|e| ConfigError::operation("failed to set configuration", e))?;
        let version = self.versions.record_version(key, value.clone()).await?;
        self.cache.invalidate(key, environment).await;
        debug!(key, version = %version.version_id, "configuration set");

        self.dispatch_change(ConfigChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
            environment,
            timestamp: Utc::now(),
            source: self.source.clone(),
        })
        .await;

        Ok(version)
    }

    /// Get a configuration value, reading through the cache
    ///
    /// Unknown keys are `None`, not an error. Repeated calls between
    /// writes hit the store at most once.
    pub async fn get_configuration(
        &self,
        key: &str,
        environment: Option<Environment>,
    ) -> Result<Option<Value>> {
        if let Some(value) = self.cache.get(key, environment).await {
            return Ok(Some(value));
        }
        let value = self
            .store
            .read(key, environment)
            .await
            .map_err(|e| ConfigError::operation("failed to get configuration", e))?;
        if let Some(ref v) = value {
            self.cache.insert(key, environment, v.clone()).await;
        }
        Ok(value)
    }

    /// Delete a configuration value
    ///
    /// Removes the live value and its cache entry; version history is
    /// retained.
    pub async fn delete_configuration(
        &self,
        key: &str,
        environment: Option<Environment>,
    ) -> Result<()> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let old_value = self.current_value(key, environment).await?;
        self.store
            .remove(key, environment)
            .await
            .map_err(|e| ConfigError::operation("failed to delete configuration", e))?;
        self.cache.invalidate(key, environment).await;
        debug!(key, "configuration deleted");

        self.dispatch_change(ConfigChange {
            key: key.to_string(),
            old_value,
            new_value: None,
            environment,
            timestamp: Utc::now(),
            source: self.source.clone(),
        })
        .await;

        Ok(())
    }

    /// Validate a full or partial configuration document without writing
    pub fn validate_configuration(
        &self,
        document: &Value,
        environment: Option<Environment>,
    ) -> ValidationReport {
        validation::validate_document(document, environment)
    }

    /// Register a handler for changes matching `pattern`
    ///
    /// `*` matches all keys, `prefix.*` matches a subtree, anything else
    /// matches exactly. Each handler sees every matching change at least
    /// once; ordering across handlers is unspecified.
    pub async fn watch_configuration(&self, pattern: impl Into<String>, handler: WatchHandler) {
        let mut watchers = self.watchers.write().await;
        watchers.push(Watcher {
            pattern: pattern.into(),
            handler,
        });
    }

    /// Apply a batch of updates atomically
    ///
    /// Every entry is validated first; any failure rejects the whole
    /// batch with no writes. Per-key locks are held across the batch.
    pub async fn bulk_update_configuration(
        &self,
        updates: HashMap<String, Value>,
        environment: Option<Environment>,
    ) -> Result<Vec<ConfigVersion>> {
        let mut errors = Vec::new();
        for (key, value) in &updates {
            let report = validation::validate_value(key, value, environment);
            errors.extend(report.errors);
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation {
                message: errors.join("; "),
            });
        }

        // Sorted acquisition order so concurrent batches cannot deadlock.
        let mut keys: Vec<&String> = updates.keys().collect();
        keys.sort();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.key_lock(key).lock_owned().await);
        }

        // Snapshot current values first so a mid-batch failure can be
        // rolled back instead of leaving the batch partially applied.
        let mut old_values = Vec::with_capacity(keys.len());
        for key in &keys {
            old_values.push(self.current_value(key, environment).await?);
        }

        let mut written = 0;
        let mut failure = None;
        for key in &keys {
            if let Err(e) = self
                .store
                .write(key, updates[*key].clone(), environment)
                .await
            {
                failure = Some(ConfigError::operation("failed to set configuration", e));
                break;
            }
            written += 1;
        }
        if let Some(e) = failure {
            self.restore_batch(&keys[..written], &old_values[..written], environment)
                .await;
            return Err(e);
        }

        let mut versions = Vec::with_capacity(keys.len());
        let mut changes = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let value = updates[*key].clone();
            match self.versions.record_version(key, value.clone()).await {
                Ok(version) => versions.push(version),
                Err(e) => {
                    self.restore_batch(&keys, &old_values, environment).await;
                    return Err(e);
                }
            }
            self.cache.invalidate(key, environment).await;
            changes.push(ConfigChange {
                key: (*key).clone(),
                old_value: old_values[i].clone(),
                new_value: Some(value),
                environment,
                timestamp: Utc::now(),
                source: self.source.clone(),
            });
        }
        drop(guards);

        for change in changes {
            self.dispatch_change(change).await;
        }
        Ok(versions)
    }

    /// Version history for `key` plus its current version id
    pub async fn get_configuration_history(&self, key: &str) -> Result<ConfigHistory> {
        self.versions.get_history(key).await
    }

    /// Best-effort rewrite of previously read values after a failed batch.
    async fn restore_batch(
        &self,
        keys: &[&String],
        old_values: &[Option<Value>],
        environment: Option<Environment>,
    ) {
        for (key, old_value) in keys.iter().zip(old_values) {
            let result = match old_value {
                Some(value) => self.store.write(key, value.clone(), environment).await,
                None => self.store.remove(key, environment).await.map(|_| ()),
            };
            if let Err(e) = result {
                warn!(key = %key, error = %e, "failed to restore value after batch failure");
            }
            self.cache.invalidate(key, environment).await;
        }
    }

    /// Restore `key` to the value recorded at `version_id`
    ///
    /// Appends a new version equal to the historical value; past versions
    /// are never rewritten. Validation is skipped since the value was
    /// previously accepted, but version, cache and notification steps
    /// still apply.
    pub async fn rollback_configuration(
        &self,
        version_id: Uuid,
        key: &str,
        environment: Option<Environment>,
    ) -> Result<ConfigVersion> {
        let historical = self.versions.get_version(key, version_id).await?;

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let old_value = self.current_value(key, environment).await?;
        self.store
            .write(key, historical.value.clone(), environment)
            .await
            .map_err(|e| ConfigError::operation("failed to set configuration", e))?;
        let version = self
            .versions
            .record_version(key, historical.value.clone())
            .await?;
        self.cache.invalidate(key, environment).await;
        debug!(key, from = %version_id, to = %version.version_id, "configuration rolled back");

        self.dispatch_change(ConfigChange {
            key: key.to_string(),
            old_value,
            new_value: Some(historical.value),
            environment,
            timestamp: Utc::now(),
            source: format!("{}:rollback", self.source),
        })
        .await;

        Ok(version)
    }

    /// Cache statistics for this manager instance
    pub async fn get_cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Drop every cached value
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn current_value(
        &self,
        key: &str,
        environment: Option<Environment>,
    ) -> Result<Option<Value>> {
        if let Some(value) = self.cache.get(key, environment).await {
            return Ok(Some(value));
        }
        self.store
            .read(key, environment)
            .await
            .map_err(|e| ConfigError::operation("failed to get configuration", e))
    }

    async fn dispatch_change(&self, change: ConfigChange) {
        let handlers: Vec<WatchHandler> = {
            let watchers = self.watchers.read().await;
            watchers
                .iter()
                .filter(|w| pattern_matches(&w.pattern, &change.key))
                .map(|w| w.handler.clone())
                .collect()
        };
        let sink = self.sink.clone();
        if handlers.is_empty() && sink.is_none() {
            return;
        }
        tokio::spawn(async move {
            for handler in handlers {
                handler(change.clone());
            }
            if let Some(sink) = sink {
                sink.deliver(change).await;
            }
        });
    }
}

fn pattern_matches(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return key == prefix || key.starts_with(&format!("{prefix}."));
    }
    pattern == key
}

/// Closure-backed sink for tests and simple embedders
pub struct FnChangeSink<F>(pub F);

#[async_trait::async_trait]
impl<F> ChangeSink for FnChangeSink<F>
where
    F: Fn(ConfigChange) + Send + Sync,
{
    async fn deliver(&self, change: ConfigChange) {
        (self.0)(change);
    }
}
