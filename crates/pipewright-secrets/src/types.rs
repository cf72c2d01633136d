//! Secret record, metadata and report types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted form of a secret
///
/// Binary fields are base64; `checksum` is a hex SHA-256 over the
/// plaintext, verified on every read independently of the AEAD tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Base64-encoded ciphertext (tag excluded)
    pub ciphertext: String,
    /// Base64-encoded 96-bit nonce
    pub nonce: String,
    /// Base64-encoded 128-bit authentication tag
    pub auth_tag: String,
    /// Hex SHA-256 of the plaintext
    pub checksum: String,
    /// Operational metadata, never sensitive
    pub metadata: SecretMetadata,
}

/// Secret metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_policy: Option<RotationPolicy>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotated_at: Option<DateTime<Utc>>,
}

impl SecretMetadata {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            description: None,
            tags: HashMap::new(),
            expires_at: None,
            rotation_policy: None,
            created_at,
            last_accessed_at: None,
            last_rotated_at: None,
        }
    }
}

/// Rotation policy attached to a secret
///
/// Advisory for an external scheduler; the manager only performs the
/// rotation itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    pub enabled: bool,
    pub interval_days: u32,
    pub auto_rotate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_before_days: Option<u32>,
}

/// Caller-supplied metadata for a new secret
#[derive(Debug, Clone, Default)]
pub struct SecretMetadataInput {
    pub description: Option<String>,
    pub tags: HashMap<String, String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rotation_policy: Option<RotationPolicy>,
}

/// Partial metadata update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct SecretMetadataUpdate {
    pub description: Option<String>,
    pub tags: Option<HashMap<String, String>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub rotation_policy: Option<Option<RotationPolicy>>,
}

/// One recorded secret access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: Uuid,
    pub key: String,
    pub operation: AccessOperation,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// Kind of secret access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessOperation {
    Store,
    Retrieve,
    Rotate,
    Delete,
}

/// Result of a bulk rotation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RotationReport {
    pub rotated: Vec<String>,
    pub failed: Vec<String>,
}

/// Result of an integrity sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

/// Result of expired-secret cleanup
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Operational audit summary
#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub total_secrets: usize,
    pub expiring_soon: Vec<String>,
    pub expired: Vec<String>,
    pub recent_access: Vec<AccessLogEntry>,
}

/// Compliance posture summary
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub total_secrets: usize,
    pub encrypted: usize,
    pub with_rotation_policy: usize,
    pub expired: usize,
    pub access_violations: usize,
}

/// Plaintext cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Sentinel used in place of values in metadata-only exports
pub const EXPORT_VALUE_SENTINEL: &str = "[REDACTED]";

/// Metadata-only view of one exported secret
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedSecretInfo {
    /// Always [`EXPORT_VALUE_SENTINEL`], never plaintext or ciphertext
    pub value: String,
    pub metadata: SecretMetadata,
}

/// Encrypted backup blob, decryptable only with the backup key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedBackup {
    pub format_version: u32,
    pub ciphertext: String,
    pub nonce: String,
    pub auth_tag: String,
}

/// Export output, by requested mode
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SecretExport {
    Metadata(HashMap<String, ExportedSecretInfo>),
    Encrypted(EncryptedBackup),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serde_round_trip() {
        let record = SecretRecord {
            ciphertext: "Y3Q=".to_string(),
            nonce: "bm9uY2U=".to_string(),
            auth_tag: "dGFn".to_string(),
            checksum: "abcdef".to_string(),
            metadata: SecretMetadata::new(Utc::now()),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: SecretRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ciphertext, record.ciphertext);
        assert_eq!(back.checksum, record.checksum);
    }

    #[test]
    fn test_optional_metadata_fields_omitted() {
        let metadata = SecretMetadata::new(Utc::now());
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(!json.contains("expires_at"));
        assert!(!json.contains("rotation_policy"));
    }
}
