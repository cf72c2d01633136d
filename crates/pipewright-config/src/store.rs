//! Durable configuration storage backends
//!
//! Stores are pure key/value persistence scoped by optional environment;
//! validation and business rules live in the manager and validator.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::{fs, sync::RwLock};

use crate::{
    error::{ConfigError, Result},
    types::Environment,
};

/// Configuration storage trait
///
/// Keys are dot-delimited paths into a structured document tree; each
/// environment scope has its own tree.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the value at `key`, or `None` if absent
    async fn read(&self, key: &str, environment: Option<Environment>) -> Result<Option<Value>>;

    /// Write `value` at `key`, creating intermediate objects as needed
    async fn write(&self, key: &str, value: Value, environment: Option<Environment>)
        -> Result<()>;

    /// Remove the value at `key`; returns whether anything was removed
    async fn remove(&self, key: &str, environment: Option<Environment>) -> Result<bool>;

    /// Read the whole document tree for a scope
    async fn read_all(&self, environment: Option<Environment>) -> Result<Value>;
}

/// Look up a dot-delimited path in a document tree
pub fn lookup_path<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in key.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Insert a value at a dot-delimited path, creating intermediate objects
///
/// Non-object intermediate values are replaced by objects.
pub fn insert_path(root: &mut Value, key: &str, value: Value) {
    let mut current = root;
    let segments: Vec<&str> = key.split('.').collect();
    for segment in &segments[..segments.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        current = current
            .as_object_mut()
            .expect("intermediate value was just coerced to an object")
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(serde_json::Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(segments[segments.len() - 1].to_string(), value);
    }
}

/// Remove a value at a dot-delimited path; returns whether it existed
pub fn remove_path(root: &mut Value, key: &str) -> bool {
    let segments: Vec<&str> = key.split('.').collect();
    let mut current = root;
    for segment in &segments[..segments.len() - 1] {
        match current.get_mut(*segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    current
        .as_object_mut()
        .map(|map| map.remove(segments[segments.len() - 1]).is_some())
        .unwrap_or(false)
}

/// In-memory configuration store
///
/// Tracks the number of reads served so cache behavior is observable in
/// tests.
pub struct MemoryConfigStore {
    documents: RwLock<HashMap<Option<Environment>, Value>>,
    reads: AtomicU64,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            reads: AtomicU64::new(0),
        }
    }

    /// Number of reads served by this store
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn read(&self, key: &str, environment: Option<Environment>) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let documents = self.documents.read().await;
        Ok(documents
            .get(&environment)
            .and_then(|doc| lookup_path(doc, key))
            .cloned())
    }

    async fn write(
        &self,
        key: &str,
        value: Value,
        environment: Option<Environment>,
    ) -> Result<()> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .entry(environment)
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        insert_path(doc, key, value);
        Ok(())
    }

    async fn remove(&self, key: &str, environment: Option<Environment>) -> Result<bool> {
        let mut documents = self.documents.write().await;
        Ok(documents
            .get_mut(&environment)
            .map(|doc| remove_path(doc, key))
            .unwrap_or(false))
    }

    async fn read_all(&self, environment: Option<Environment>) -> Result<Value> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let documents = self.documents.read().await;
        Ok(documents
            .get(&environment)
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }
}

/// File-backed configuration store
///
/// One JSON document per environment scope (`config.json` for the global
/// scope, `config.<env>.json` otherwise). Writes go to a temp file first
/// and are renamed into place.
pub struct FileConfigStore {
    dir: PathBuf,
    reads: AtomicU64,
    // Serializes read-modify-write cycles on the document files.
    io_lock: RwLock<()>,
}

impl FileConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            reads: AtomicU64::new(0),
            io_lock: RwLock::new(()),
        }
    }

    /// Number of reads served by this store
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn document_path(&self, environment: Option<Environment>) -> PathBuf {
        match environment {
            Some(env) => self.dir.join(format!("config.{env}.json")),
            None => self.dir.join("config.json"),
        }
    }

    async fn load_document(&self, environment: Option<Environment>) -> Result<Value> {
        let path = self.document_path(environment);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Value::Object(serde_json::Map::new()))
            }
            Err(e) => Err(ConfigError::Storage {
                message: format!("failed to read {}: {e}", path.display()),
            }),
        }
    }

    async fn save_document(&self, environment: Option<Environment>, doc: &Value) -> Result<()> {
        let path = self.document_path(environment);
        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(doc)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn read(&self, key: &str, environment: Option<Environment>) -> Result<Option<Value>> {
        let _guard = self.io_lock.read().await;
        self.reads.fetch_add(1, Ordering::SeqCst);
        let doc = self.load_document(environment).await?;
        Ok(lookup_path(&doc, key).cloned())
    }

    async fn write(
        &self,
        key: &str,
        value: Value,
        environment: Option<Environment>,
    ) -> Result<()> {
        let _guard = self.io_lock.write().await;
        let mut doc = self.load_document(environment).await?;
        insert_path(&mut doc, key, value);
        self.save_document(environment, &doc).await
    }

    async fn remove(&self, key: &str, environment: Option<Environment>) -> Result<bool> {
        let _guard = self.io_lock.write().await;
        let mut doc = self.load_document(environment).await?;
        let removed = remove_path(&mut doc, key);
        if removed {
            self.save_document(environment, &doc).await?;
        }
        Ok(removed)
    }

    async fn read_all(&self, environment: Option<Environment>) -> Result<Value> {
        let _guard = self.io_lock.read().await;
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.load_document(environment).await
    }
}
