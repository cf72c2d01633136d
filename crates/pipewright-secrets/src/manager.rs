//! Secret manager
//!
//! Validate, encrypt, persist, audit. Every stored value is AEAD-encrypted
//! with a per-secret nonce and carries an independent plaintext checksum
//! verified on every read. Rotation and writes to the same key are
//! serialized; readers see either the old or the new record, never a torn
//! write.

use std::{collections::HashMap, sync::Arc};

use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;
use dashmap::DashMap;
use rand::RngCore;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::{
    audit::AccessLog,
    backend::SecretBackend,
    clock::{Clock, SystemClock},
    encryption::{checksum, EncryptedPayload, SecretCipher},
    error::{Result, SecretError},
    types::{
        AccessOperation, AuditSummary, CacheStats, CleanupReport, ComplianceReport,
        EncryptedBackup, ExportedSecretInfo, IntegrityReport, RotationReport, SecretExport,
        SecretMetadata, SecretMetadataInput, SecretMetadataUpdate, SecretRecord,
        EXPORT_VALUE_SENTINEL,
    },
};

const MAX_KEY_LEN: usize = 255;
const MAX_VALUE_LEN: usize = 64 * 1024;
const DEFAULT_EXPIRY_HORIZON_DAYS: i64 = 7;
const RECENT_ACCESS_LIMIT: usize = 50;

/// Encrypted secret store over a pluggable backend
pub struct SecretManager {
    backend: Arc<dyn SecretBackend>,
    cipher: SecretCipher,
    clock: Arc<dyn Clock>,
    access_log: AccessLog,
    cache: RwLock<HashMap<String, String>>,
    cache_hits: std::sync::atomic::AtomicU64,
    cache_misses: std::sync::atomic::AtomicU64,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    expiry_horizon: Duration,
}

impl SecretManager {
    pub fn new(backend: Arc<dyn SecretBackend>, cipher: SecretCipher) -> Self {
        Self {
            backend,
            cipher,
            clock: Arc::new(SystemClock),
            access_log: AccessLog::new(),
            cache: RwLock::new(HashMap::new()),
            cache_hits: std::sync::atomic::AtomicU64::new(0),
            cache_misses: std::sync::atomic::AtomicU64::new(0),
            key_locks: DashMap::new(),
            expiry_horizon: Duration::days(DEFAULT_EXPIRY_HORIZON_DAYS),
        }
    }

    /// Replace the clock source (tests advance time through this)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Horizon for the audit summary's expiring-soon bucket
    pub fn with_expiry_horizon_days(mut self, days: u32) -> Self {
        self.expiry_horizon = Duration::days(days as i64);
        self
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Validate, encrypt and persist a secret value
    pub async fn store_secret(
        &self,
        key: &str,
        value: &str,
        metadata: Option<SecretMetadataInput>,
    ) -> Result<()> {
        validate_key(key)?;
        validate_value(value)?;

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let existing = self.backend.get(key).await?;
        let input = metadata.unwrap_or_default();
        let metadata = SecretMetadata {
            description: input.description,
            tags: input.tags,
            expires_at: input.expires_at,
            rotation_policy: input.rotation_policy,
            // Overwriting keeps the original creation time.
            created_at: existing.map(|r| r.metadata.created_at).unwrap_or(now),
            last_accessed_at: None,
            last_rotated_at: None,
        };

        let record = self.encrypt_record(value, metadata)?;
        self.backend.put(key, &record).await?;
        self.invalidate_cached(key).await;
        self.access_log
            .record(self.clock.as_ref(), key, AccessOperation::Store, true)
            .await;
        debug!(key, "secret stored");
        Ok(())
    }

    /// Decrypt and return a secret value
    ///
    /// Distinguishes absence, expiry and corruption: unknown keys fail as
    /// not-found, past `expires_at` as expired, checksum mismatch as an
    /// integrity failure. Holds the per-key lock so the access-time
    /// write-back cannot clobber a concurrent store, rotate or delete.
    pub async fn retrieve_secret(&self, key: &str) -> Result<String> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let record = self
            .backend
            .get(key)
            .await?
            .ok_or_else(|| SecretError::NotFound {
                key: key.to_string(),
            })?;

        let now = self.clock.now();
        if let Some(expires_at) = record.metadata.expires_at {
            if expires_at < now {
                self.access_log
                    .record(self.clock.as_ref(), key, AccessOperation::Retrieve, false)
                    .await;
                return Err(SecretError::Expired {
                    key: key.to_string(),
                });
            }
        }

        if let Some(cached) = self.cached(key).await {
            self.access_log
                .record(self.clock.as_ref(), key, AccessOperation::Retrieve, true)
                .await;
            return Ok(cached);
        }

        let plaintext = match self.decrypt_record(&record) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                self.access_log
                    .record(self.clock.as_ref(), key, AccessOperation::Retrieve, false)
                    .await;
                return Err(e);
            }
        };
        if checksum(plaintext.as_bytes()) != record.checksum {
            self.access_log
                .record(self.clock.as_ref(), key, AccessOperation::Retrieve, false)
                .await;
            return Err(SecretError::Integrity {
                key: key.to_string(),
            });
        }

        let mut updated = record;
        updated.metadata.last_accessed_at = Some(now);
        if let Err(e) = self.backend.put(key, &updated).await {
            warn!(key, error = %e, "failed to record secret access time");
        }

        self.access_log
            .record(self.clock.as_ref(), key, AccessOperation::Retrieve, true)
            .await;
        let mut cache = self.cache.write().await;
        cache.insert(key.to_string(), plaintext.clone());
        Ok(plaintext)
    }

    /// Remove a secret
    pub async fn delete_secret(&self, key: &str) -> Result<()> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        if self.backend.get(key).await?.is_none() {
            return Err(SecretError::NotFound {
                key: key.to_string(),
            });
        }
        self.backend.delete(key).await?;
        self.invalidate_cached(key).await;
        self.access_log
            .record(self.clock.as_ref(), key, AccessOperation::Delete, true)
            .await;
        debug!(key, "secret deleted");
        Ok(())
    }

    /// Stored keys only, never values
    pub async fn list_secrets(&self) -> Result<Vec<String>> {
        self.backend.list().await
    }

    /// Metadata for a secret; explicitly excludes the value
    pub async fn get_secret_info(&self, key: &str) -> Result<SecretMetadata> {
        self.backend
            .get(key)
            .await?
            .map(|r| r.metadata)
            .ok_or_else(|| SecretError::NotFound {
                key: key.to_string(),
            })
    }

    /// Merge a partial metadata update
    pub async fn update_secret_metadata(
        &self,
        key: &str,
        update: SecretMetadataUpdate,
    ) -> Result<SecretMetadata> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let mut record = self
            .backend
            .get(key)
            .await?
            .ok_or_else(|| SecretError::NotFound {
                key: key.to_string(),
            })?;
        if let Some(description) = update.description {
            record.metadata.description = Some(description);
        }
        if let Some(tags) = update.tags {
            record.metadata.tags = tags;
        }
        if let Some(expires_at) = update.expires_at {
            record.metadata.expires_at = expires_at;
        }
        if let Some(rotation_policy) = update.rotation_policy {
            record.metadata.rotation_policy = rotation_policy;
        }
        self.backend.put(key, &record).await?;
        Ok(record.metadata)
    }

    /// Replace a secret's value, keeping its identity and creation time
    ///
    /// With no replacement supplied a new 32-byte random value is
    /// generated. Returns the new plaintext.
    pub async fn rotate_secret(&self, key: &str, replacement: Option<&str>) -> Result<String> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let record = self
            .backend
            .get(key)
            .await?
            .ok_or_else(|| SecretError::NotFound {
                key: key.to_string(),
            })?;

        let new_value = match replacement {
            Some(value) => {
                validate_value(value)?;
                value.to_string()
            }
            None => generate_secret_value(),
        };

        let mut metadata = record.metadata;
        metadata.last_rotated_at = Some(self.clock.now());
        let new_record = self.encrypt_record(&new_value, metadata)?;
        self.backend.put(key, &new_record).await?;
        self.invalidate_cached(key).await;
        self.access_log
            .record(self.clock.as_ref(), key, AccessOperation::Rotate, true)
            .await;
        debug!(key, "secret rotated");
        Ok(new_value)
    }

    /// Rotate every secret with an enabled rotation policy
    ///
    /// One secret's failure never aborts the rest.
    pub async fn bulk_rotate_secrets(&self) -> Result<RotationReport> {
        let mut report = RotationReport::default();
        for key in self.backend.list().await? {
            let enabled = match self.backend.get(&key).await {
                Ok(Some(record)) => record
                    .metadata
                    .rotation_policy
                    .as_ref()
                    .is_some_and(|p| p.enabled),
                Ok(None) => false,
                Err(e) => {
                    warn!(key, error = %e, "bulk rotation: failed to inspect secret");
                    report.failed.push(key);
                    continue;
                }
            };
            if !enabled {
                continue;
            }
            match self.rotate_secret(&key, None).await {
                Ok(_) => report.rotated.push(key),
                Err(e) => {
                    warn!(key, error = %e, "bulk rotation failed");
                    report.failed.push(key);
                }
            }
        }
        Ok(report)
    }

    /// Recompute every checksum without exposing plaintext to callers
    pub async fn validate_secret_integrity(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();
        for key in self.backend.list().await? {
            let Some(record) = self.backend.get(&key).await? else {
                continue;
            };
            let intact = self
                .decrypt_record(&record)
                .map(|plaintext| checksum(plaintext.as_bytes()) == record.checksum)
                .unwrap_or(false);
            if intact {
                report.valid.push(key);
            } else {
                report.invalid.push(key);
            }
        }
        Ok(report)
    }

    /// Operational audit: totals, upcoming and past expirations, accesses
    pub async fn audit_secrets(&self) -> Result<AuditSummary> {
        let now = self.clock.now();
        let horizon = now + self.expiry_horizon;
        let mut expiring_soon = Vec::new();
        let mut expired = Vec::new();
        let keys = self.backend.list().await?;
        for key in &keys {
            let Some(record) = self.backend.get(key).await? else {
                continue;
            };
            if let Some(expires_at) = record.metadata.expires_at {
                if expires_at < now {
                    expired.push(key.clone());
                } else if expires_at <= horizon {
                    expiring_soon.push(key.clone());
                }
            }
        }
        Ok(AuditSummary {
            total_secrets: keys.len(),
            expiring_soon,
            expired,
            recent_access: self.access_log.recent(RECENT_ACCESS_LIMIT).await,
        })
    }

    /// Compliance posture across the store
    pub async fn get_compliance_report(&self) -> Result<ComplianceReport> {
        let now = self.clock.now();
        let keys = self.backend.list().await?;
        let mut encrypted = 0;
        let mut with_rotation_policy = 0;
        let mut expired = 0;
        for key in &keys {
            let Some(record) = self.backend.get(key).await? else {
                continue;
            };
            if !record.ciphertext.is_empty() {
                encrypted += 1;
            }
            if record.metadata.rotation_policy.is_some() {
                with_rotation_policy += 1;
            }
            if record
                .metadata
                .expires_at
                .is_some_and(|expires_at| expires_at < now)
            {
                expired += 1;
            }
        }
        Ok(ComplianceReport {
            total_secrets: keys.len(),
            encrypted,
            with_rotation_policy,
            expired,
            access_violations: self.access_log.violation_count().await,
        })
    }

    /// Delete every expired secret
    pub async fn cleanup_expired_secrets(&self) -> Result<CleanupReport> {
        let now = self.clock.now();
        let mut report = CleanupReport::default();
        for key in self.backend.list().await? {
            let expired = match self.backend.get(&key).await {
                Ok(Some(record)) => record
                    .metadata
                    .expires_at
                    .is_some_and(|expires_at| expires_at < now),
                Ok(None) => false,
                Err(e) => {
                    warn!(key, error = %e, "cleanup: failed to inspect secret");
                    report.failed.push(key);
                    continue;
                }
            };
            if !expired {
                continue;
            }
            match self.delete_secret(&key).await {
                Ok(()) => report.deleted.push(key),
                Err(e) => {
                    warn!(key, error = %e, "cleanup failed");
                    report.failed.push(key);
                }
            }
        }
        Ok(report)
    }

    /// Export the store
    ///
    /// Without a backup key the export carries metadata only, with every
    /// value replaced by a sentinel. With one, the full record set is
    /// encrypted under a key derived from it.
    pub async fn export_secrets(&self, backup_key: Option<&str>) -> Result<SecretExport> {
        let mut records = HashMap::new();
        for key in self.backend.list().await? {
            if let Some(record) = self.backend.get(&key).await? {
                records.insert(key, record);
            }
        }

        match backup_key {
            None => {
                let metadata_only = records
                    .into_iter()
                    .map(|(key, record)| {
                        (
                            key,
                            ExportedSecretInfo {
                                value: EXPORT_VALUE_SENTINEL.to_string(),
                                metadata: record.metadata,
                            },
                        )
                    })
                    .collect();
                Ok(SecretExport::Metadata(metadata_only))
            }
            Some(backup_key) => {
                let backup_cipher = SecretCipher::from_password(backup_key)?;
                let serialized = serde_json::to_vec(&records)?;
                let payload = backup_cipher.encrypt(&serialized)?;
                Ok(SecretExport::Encrypted(EncryptedBackup {
                    format_version: 1,
                    ciphertext: general_purpose::STANDARD.encode(&payload.ciphertext),
                    nonce: general_purpose::STANDARD.encode(payload.nonce),
                    auth_tag: general_purpose::STANDARD.encode(payload.auth_tag),
                }))
            }
        }
    }

    /// Plaintext cache statistics
    pub async fn get_cache_stats(&self) -> CacheStats {
        use std::sync::atomic::Ordering;
        let cache = self.cache.read().await;
        CacheStats {
            entries: cache.len(),
            hits: self.cache_hits.load(Ordering::SeqCst),
            misses: self.cache_misses.load(Ordering::SeqCst),
        }
    }

    /// Drop every cached plaintext
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    async fn cached(&self, key: &str) -> Option<String> {
        use std::sync::atomic::Ordering;
        let cache = self.cache.read().await;
        match cache.get(key) {
            Some(value) => {
                self.cache_hits.fetch_add(1, Ordering::SeqCst);
                Some(value.clone())
            }
            None => {
                self.cache_misses.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    async fn invalidate_cached(&self, key: &str) {
        let mut cache = self.cache.write().await;
        cache.remove(key);
    }

    fn encrypt_record(&self, value: &str, metadata: SecretMetadata) -> Result<SecretRecord> {
        let payload = self.cipher.encrypt(value.as_bytes())?;
        Ok(SecretRecord {
            ciphertext: general_purpose::STANDARD.encode(&payload.ciphertext),
            nonce: general_purpose::STANDARD.encode(payload.nonce),
            auth_tag: general_purpose::STANDARD.encode(payload.auth_tag),
            checksum: checksum(value.as_bytes()),
            metadata,
        })
    }

    fn decrypt_record(&self, record: &SecretRecord) -> Result<String> {
        let nonce_bytes = general_purpose::STANDARD.decode(&record.nonce)?;
        let tag_bytes = general_purpose::STANDARD.decode(&record.auth_tag)?;
        let payload = EncryptedPayload {
            ciphertext: general_purpose::STANDARD.decode(&record.ciphertext)?,
            nonce: nonce_bytes
                .try_into()
                .map_err(|_| SecretError::Decryption {
                    message: "invalid nonce length".to_string(),
                })?,
            auth_tag: tag_bytes.try_into().map_err(|_| SecretError::Decryption {
                message: "invalid auth tag length".to_string(),
            })?,
        };
        let plaintext = self.cipher.decrypt(&payload)?;
        Ok(String::from_utf8(plaintext)?)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SecretError::Validation {
            message: "secret key must not be empty".to_string(),
        });
    }
    if key.len() > MAX_KEY_LEN {
        return Err(SecretError::Validation {
            message: format!("secret key too long: {} characters (max {MAX_KEY_LEN})", key.len()),
        });
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(SecretError::Validation {
            message: format!("secret key '{key}' contains invalid characters"),
        });
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SecretError::Validation {
            message: "secret value must not be empty".to_string(),
        });
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(SecretError::Validation {
            message: format!("secret value too large: {} bytes (max {MAX_VALUE_LEN})", value.len()),
        });
    }
    Ok(())
}

fn generate_secret_value() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}
