//! Secret storage backend abstraction and the default file backend

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::{
    error::{Result, SecretError},
    types::SecretRecord,
};

/// Uniform put/get/delete/list contract over storage providers
///
/// Backends store already-encrypted records; plaintext never reaches a
/// backend.
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Store or replace the record for `key`
    async fn put(&self, key: &str, record: &SecretRecord) -> Result<()>;

    /// Fetch the record for `key`, or `None` if absent
    async fn get(&self, key: &str) -> Result<Option<SecretRecord>>;

    /// Remove the record for `key`; absent keys are not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// All stored keys
    async fn list(&self) -> Result<Vec<String>>;
}

/// Local encrypted file store, the default backend
///
/// One JSON file per secret under a directory; writes go through a temp
/// file and rename.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn secret_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.secret.json"))
    }
}

#[async_trait]
impl SecretBackend for FileBackend {
    async fn put(&self, key: &str, record: &SecretRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.secret_path(key);
        let content = serde_json::to_string_pretty(record)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretRecord>> {
        match fs::read_to_string(self.secret_path(key)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SecretError::Backend {
                message: format!("failed to read secret {key}: {e}"),
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.secret_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SecretError::Backend {
                message: format!("failed to delete secret {key}: {e}"),
            }),
        }
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = name.strip_suffix(".secret.json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SecretMetadata;
    use chrono::Utc;

    fn record() -> SecretRecord {
        SecretRecord {
            ciphertext: "Y3Q=".to_string(),
            nonce: "bm9uY2U=".to_string(),
            auth_tag: "dGFn".to_string(),
            checksum: "00".to_string(),
            metadata: SecretMetadata::new(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());

        assert_eq!(backend.get("db-pass").await.unwrap().map(|r| r.checksum), None);
        backend.put("db-pass", &record()).await.unwrap();
        let loaded = backend.get("db-pass").await.unwrap().unwrap();
        assert_eq!(loaded.ciphertext, "Y3Q=");

        assert_eq!(backend.list().await.unwrap(), vec!["db-pass".to_string()]);
        backend.delete("db-pass").await.unwrap();
        assert!(backend.get("db-pass").await.unwrap().is_none());
        // Deleting an absent key is not an error.
        backend.delete("db-pass").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_on_missing_directory_is_empty() {
        let backend = FileBackend::new("/nonexistent/pipewright-secrets-test");
        assert!(backend.list().await.unwrap().is_empty());
    }
}
