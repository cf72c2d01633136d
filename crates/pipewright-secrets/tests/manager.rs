use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::Duration;
use pipewright_secrets::{
    FileBackend, ManualClock, RotationPolicy, SecretBackend, SecretCipher, SecretError,
    SecretExport, SecretManager, SecretMetadataInput, SecretMetadataUpdate, SecretRecord,
    EXPORT_VALUE_SENTINEL,
};
use tempfile::TempDir;
use tokio::sync::Notify;

fn manager(dir: &TempDir) -> SecretManager {
    SecretManager::new(
        Arc::new(FileBackend::new(dir.path())),
        SecretCipher::from_key([42u8; 32]),
    )
}

fn manager_with_clock(dir: &TempDir, clock: Arc<ManualClock>) -> SecretManager {
    manager(dir).with_clock(clock)
}

#[tokio::test]
async fn test_store_then_retrieve_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);

    manager.store_secret("db-pass", "s3cr3t", None).await.unwrap();
    assert_eq!(manager.retrieve_secret("db-pass").await.unwrap(), "s3cr3t");
}

#[tokio::test]
async fn test_retrieve_unknown_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    assert!(matches!(
        manager.retrieve_secret("missing").await,
        Err(SecretError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_invalid_keys_and_values_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);

    assert!(matches!(
        manager.store_secret("bad key!", "v", None).await,
        Err(SecretError::Validation { .. })
    ));
    assert!(matches!(
        manager.store_secret("ok-key", "", None).await,
        Err(SecretError::Validation { .. })
    ));
    assert!(manager.list_secrets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupted_checksum_is_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    manager.store_secret("db-pass", "s3cr3t", None).await.unwrap();

    // Corrupt the persisted checksum field directly.
    let path = dir.path().join("db-pass.secret.json");
    let content = std::fs::read_to_string(&path).unwrap();
    let mut record: serde_json::Value = serde_json::from_str(&content).unwrap();
    record["checksum"] = serde_json::json!("0".repeat(64));
    std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

    assert!(matches!(
        manager.retrieve_secret("db-pass").await,
        Err(SecretError::Integrity { .. })
    ));

    let integrity = manager.validate_secret_integrity().await.unwrap();
    assert_eq!(integrity.invalid, vec!["db-pass".to_string()]);
    assert!(integrity.valid.is_empty());
}

#[tokio::test]
async fn test_expired_secret_fails_with_expired_error() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let manager = manager_with_clock(&dir, clock.clone());

    manager
        .store_secret(
            "db-pass",
            "s3cr3t",
            Some(SecretMetadataInput {
                expires_at: Some(clock.now_plus_days(1)),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    assert_eq!(manager.retrieve_secret("db-pass").await.unwrap(), "s3cr3t");

    clock.advance(Duration::days(2));
    let err = manager.retrieve_secret("db-pass").await.unwrap_err();
    assert!(err.to_string().contains("has expired"));
}

#[tokio::test]
async fn test_rotation_changes_value_and_preserves_created_at() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    manager.store_secret("api-key", "original", None).await.unwrap();
    let created_at = manager.get_secret_info("api-key").await.unwrap().created_at;

    let before = manager.retrieve_secret("api-key").await.unwrap();
    let rotated = manager.rotate_secret("api-key", None).await.unwrap();
    let after = manager.retrieve_secret("api-key").await.unwrap();

    assert_ne!(before, after);
    assert_eq!(rotated, after);

    let info = manager.get_secret_info("api-key").await.unwrap();
    assert_eq!(info.created_at, created_at);
    assert!(info.last_rotated_at.is_some());
}

#[tokio::test]
async fn test_bulk_rotation_only_touches_enabled_policies() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    manager
        .store_secret(
            "rotating",
            "v1",
            Some(SecretMetadataInput {
                rotation_policy: Some(RotationPolicy {
                    enabled: true,
                    interval_days: 30,
                    auto_rotate: true,
                    notify_before_days: None,
                }),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    manager.store_secret("static", "v1", None).await.unwrap();

    let report = manager.bulk_rotate_secrets().await.unwrap();
    assert_eq!(report.rotated, vec!["rotating".to_string()]);
    assert!(report.failed.is_empty());
    assert_eq!(manager.retrieve_secret("static").await.unwrap(), "v1");
    assert_ne!(manager.retrieve_secret("rotating").await.unwrap(), "v1");
}

#[tokio::test]
async fn test_metadata_update_is_partial() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    manager
        .store_secret(
            "db-pass",
            "v",
            Some(SecretMetadataInput {
                description: Some("database password".to_string()),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let updated = manager
        .update_secret_metadata(
            "db-pass",
            SecretMetadataUpdate {
                tags: Some([("team".to_string(), "infra".to_string())].into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.description.as_deref(), Some("database password"));
    assert_eq!(updated.tags.get("team").map(String::as_str), Some("infra"));
}

#[tokio::test]
async fn test_audit_and_compliance_reports() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let manager = manager_with_clock(&dir, clock.clone());

    manager
        .store_secret(
            "soon",
            "v",
            Some(SecretMetadataInput {
                expires_at: Some(clock.now_plus_days(3)),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    manager
        .store_secret(
            "later",
            "v",
            Some(SecretMetadataInput {
                expires_at: Some(clock.now_plus_days(30)),
                rotation_policy: Some(RotationPolicy {
                    enabled: false,
                    interval_days: 90,
                    auto_rotate: false,
                    notify_before_days: None,
                }),
                ..Default::default()
            }),
        )
        .await
        .unwrap();

    let audit = manager.audit_secrets().await.unwrap();
    assert_eq!(audit.total_secrets, 2);
    assert_eq!(audit.expiring_soon, vec!["soon".to_string()]);
    assert!(audit.expired.is_empty());
    assert!(!audit.recent_access.is_empty());

    // A failed retrieval counts as an access violation.
    clock.advance(Duration::days(4));
    let _ = manager.retrieve_secret("soon").await;

    let report = manager.get_compliance_report().await.unwrap();
    assert_eq!(report.total_secrets, 2);
    assert_eq!(report.encrypted, 2);
    assert_eq!(report.with_rotation_policy, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.access_violations, 1);
}

#[tokio::test]
async fn test_cleanup_removes_expired_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::starting_now());
    let manager = manager_with_clock(&dir, clock.clone());

    manager
        .store_secret(
            "db-pass",
            "s3cr3t",
            Some(SecretMetadataInput {
                expires_at: Some(clock.now_plus_days(1)),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    manager.store_secret("keeper", "v", None).await.unwrap();

    clock.advance(Duration::days(2));
    let report = manager.cleanup_expired_secrets().await.unwrap();
    assert_eq!(report.deleted, vec!["db-pass".to_string()]);
    assert!(report.failed.is_empty());
    assert_eq!(manager.list_secrets().await.unwrap(), vec!["keeper".to_string()]);
}

#[tokio::test]
async fn test_metadata_export_never_leaks_values() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    manager.store_secret("db-pass", "hunter2-plaintext", None).await.unwrap();

    let export = manager.export_secrets(None).await.unwrap();
    let serialized = serde_json::to_string(&export).unwrap();
    assert!(!serialized.contains("hunter2-plaintext"));
    assert!(serialized.contains(EXPORT_VALUE_SENTINEL));

    match export {
        SecretExport::Metadata(map) => {
            assert_eq!(map["db-pass"].value, EXPORT_VALUE_SENTINEL);
        }
        SecretExport::Encrypted(_) => panic!("expected metadata export"),
    }
}

#[tokio::test]
async fn test_encrypted_backup_is_not_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    manager.store_secret("db-pass", "hunter2-plaintext", None).await.unwrap();

    let export = manager.export_secrets(Some("backup-key")).await.unwrap();
    let serialized = serde_json::to_string(&export).unwrap();
    assert!(!serialized.contains("hunter2-plaintext"));
    // Key names are inside the encrypted blob, not the envelope.
    assert!(!serialized.contains("db-pass"));
}

#[tokio::test]
async fn test_cache_serves_repeat_reads_and_clears() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    manager.store_secret("db-pass", "s3cr3t", None).await.unwrap();

    manager.retrieve_secret("db-pass").await.unwrap();
    manager.retrieve_secret("db-pass").await.unwrap();
    let stats = manager.get_cache_stats().await;
    assert_eq!(stats.entries, 1);
    assert!(stats.hits >= 1);

    manager.clear_cache().await;
    assert_eq!(manager.get_cache_stats().await.entries, 0);
}

#[tokio::test]
async fn test_delete_then_list_omits_key() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    manager.store_secret("db-pass", "s3cr3t", None).await.unwrap();
    manager.delete_secret("db-pass").await.unwrap();

    assert!(manager.list_secrets().await.unwrap().is_empty());
    assert!(matches!(
        manager.delete_secret("db-pass").await,
        Err(SecretError::NotFound { .. })
    ));
}

/// Backend whose next `get` parks until released, exposing interleavings.
struct GatedBackend {
    inner: FileBackend,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedBackend {
    fn new(dir: &TempDir) -> Self {
        Self {
            inner: FileBackend::new(dir.path()),
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl SecretBackend for GatedBackend {
    async fn put(&self, key: &str, record: &SecretRecord) -> pipewright_secrets::Result<()> {
        self.inner.put(key, record).await
    }

    async fn get(&self, key: &str) -> pipewright_secrets::Result<Option<SecretRecord>> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> pipewright_secrets::Result<()> {
        self.inner.delete(key).await
    }

    async fn list(&self) -> pipewright_secrets::Result<Vec<String>> {
        self.inner.list().await
    }
}

#[tokio::test]
async fn test_retrieve_overlapping_rotation_does_not_undo_it() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(GatedBackend::new(&dir));
    let manager = Arc::new(SecretManager::new(
        backend.clone(),
        SecretCipher::from_key([42u8; 32]),
    ));

    manager.store_secret("db-pass", "v1", None).await.unwrap();

    // Park the next backend read mid-retrieve, then rotate while the
    // retrieve is in flight.
    backend.armed.store(true, Ordering::SeqCst);
    let reader = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.retrieve_secret("db-pass").await })
    };
    backend.entered.notified().await;

    let mut rotation = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.rotate_secret("db-pass", Some("v2")).await })
    };

    // The retrieve holds the key lock, so the rotation must wait for it.
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(100), &mut rotation)
            .await
            .is_err()
    );

    backend.release.notify_one();
    assert_eq!(reader.await.unwrap().unwrap(), "v1");
    rotation.await.unwrap().unwrap();

    manager.clear_cache().await;
    assert_eq!(manager.retrieve_secret("db-pass").await.unwrap(), "v2");
}
