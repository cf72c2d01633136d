//! # Pipewright Secrets
//!
//! Encrypted secret store for Pipewright.
//!
//! This crate provides:
//! - AES-256-GCM encryption with an independent plaintext checksum
//! - Pluggable storage backends: local file store, HashiCorp Vault,
//!   AWS Secrets Manager, Azure Key Vault, GCP Secret Manager
//! - Expiration, rotation, access auditing and compliance reporting
//! - Metadata-only and encrypted-backup exports

pub mod audit;
pub mod backend;
pub mod backends;
pub mod clock;
pub mod encryption;
pub mod error;
pub mod manager;
pub mod types;

pub use audit::AccessLog;
pub use backend::{FileBackend, SecretBackend};
pub use backends::{
    create_backend, AwsBackend, AwsConfig, AzureBackend, AzureConfig, BackendConfig, GcpBackend,
    GcpConfig, VaultBackend, VaultConfig,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use encryption::{checksum, EncryptedPayload, SecretCipher};
pub use error::{Result, SecretError};
pub use manager::SecretManager;
pub use types::{
    AccessLogEntry, AccessOperation, AuditSummary, CacheStats, CleanupReport, ComplianceReport,
    EncryptedBackup, ExportedSecretInfo, IntegrityReport, RotationPolicy, RotationReport,
    SecretExport, SecretMetadata, SecretMetadataInput, SecretMetadataUpdate, SecretRecord,
    EXPORT_VALUE_SENTINEL,
};
