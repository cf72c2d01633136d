//! Append-only version history per configuration key

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;
use tokio::fs;
use tokio::sync::{OnceCell, RwLock};
use uuid::Uuid;

use crate::{
    error::{ConfigError, Result},
    types::{ConfigHistory, ConfigVersion},
};

pub const DEFAULT_MAX_VERSIONS: usize = 50;

/// Per-key version history with bounded retention
///
/// History is only ever extended; rollback at the manager level appends a
/// new version rather than rewriting past entries. Retention prunes oldest
/// first and never touches the current version. With a log path set, the
/// full history map is persisted as one JSON document holding a version
/// log per key, loaded back on first use.
pub struct VersionManager {
    histories: RwLock<HashMap<String, Vec<ConfigVersion>>>,
    max_versions: usize,
    log_path: Option<PathBuf>,
    loaded: OnceCell<()>,
}

impl VersionManager {
    pub fn new() -> Self {
        Self::with_max_versions(DEFAULT_MAX_VERSIONS)
    }

    pub fn with_max_versions(max_versions: usize) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            // A key that has been written always retains its current version.
            max_versions: max_versions.max(1),
            log_path: None,
            loaded: OnceCell::new(),
        }
    }

    /// Persist the history map to `path`, reloading it on first use
    pub fn persisted_at(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub(crate) fn set_max_versions(&mut self, max_versions: usize) {
        self.max_versions = max_versions.max(1);
    }

    pub(crate) fn set_log_path(&mut self, path: PathBuf) {
        self.log_path = Some(path);
    }

    /// Append a version entry for `key`
    pub async fn record_version(&self, key: &str, value: Value) -> Result<ConfigVersion> {
        self.ensure_loaded().await?;
        let version = ConfigVersion {
            version_id: Uuid::new_v4(),
            key: key.to_string(),
            value,
            timestamp: Utc::now(),
        };
        let mut histories = self.histories.write().await;
        let history = histories.entry(key.to_string()).or_default();
        history.push(version.clone());
        while history.len() > self.max_versions {
            history.remove(0);
        }
        self.persist(&histories).await?;
        Ok(version)
    }

    /// Ordered history for `key`, oldest first
    pub async fn get_history(&self, key: &str) -> Result<ConfigHistory> {
        self.ensure_loaded().await?;
        let histories = self.histories.read().await;
        let versions = histories.get(key).cloned().unwrap_or_default();
        let current_version = versions.last().map(|v| v.version_id);
        Ok(ConfigHistory {
            versions,
            current_version,
        })
    }

    /// The value recorded at `version_id` for `key`
    pub async fn get_version(&self, key: &str, version_id: Uuid) -> Result<ConfigVersion> {
        self.ensure_loaded().await?;
        let histories = self.histories.read().await;
        histories
            .get(key)
            .and_then(|history| history.iter().find(|v| v.version_id == version_id))
            .cloned()
            .ok_or_else(|| ConfigError::VersionNotFound {
                version_id: version_id.to_string(),
                key: key.to_string(),
            })
    }

    async fn ensure_loaded(&self) -> Result<()> {
        let Some(path) = &self.log_path else {
            return Ok(());
        };
        self.loaded
            .get_or_try_init(|| async {
                match fs::read_to_string(path).await {
                    Ok(content) => {
                        let stored: HashMap<String, Vec<ConfigVersion>> =
                            serde_json::from_str(&content)?;
                        *self.histories.write().await = stored;
                        Ok(())
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(ConfigError::from(e)),
                }
            })
            .await
            .map(|_| ())
    }

    async fn persist(&self, histories: &HashMap<String, Vec<ConfigVersion>>) -> Result<()> {
        let Some(path) = &self.log_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(histories)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new()
    }
}
