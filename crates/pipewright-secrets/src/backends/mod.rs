//! Remote secret storage backends
//!
//! Each provider keeps its own auth flow self-contained behind the
//! [`SecretBackend`](crate::backend::SecretBackend) trait; selection
//! happens once at construction time.

pub mod aws;
pub mod azure;
pub mod gcp;
pub mod vault;

use std::{path::PathBuf, sync::Arc};

pub use aws::{AwsBackend, AwsConfig};
pub use azure::{AzureBackend, AzureConfig};
pub use gcp::{GcpBackend, GcpConfig};
pub use vault::{VaultBackend, VaultConfig};

use crate::{
    backend::{FileBackend, SecretBackend},
    error::Result,
};

/// Backend selection, resolved once at construction
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Local encrypted file store (default)
    File { dir: PathBuf },
    Vault(VaultConfig),
    Aws(AwsConfig),
    Azure(AzureConfig),
    Gcp(GcpConfig),
}

/// Build the backend named by `config`
///
/// Cloud backends validate their connection settings here and fail fast
/// rather than at first call.
pub fn create_backend(config: BackendConfig) -> Result<Arc<dyn SecretBackend>> {
    Ok(match config {
        BackendConfig::File { dir } => Arc::new(FileBackend::new(dir)),
        BackendConfig::Vault(cfg) => Arc::new(VaultBackend::new(cfg)?),
        BackendConfig::Aws(cfg) => Arc::new(AwsBackend::new(cfg)?),
        BackendConfig::Azure(cfg) => Arc::new(AzureBackend::new(cfg)?),
        BackendConfig::Gcp(cfg) => Arc::new(GcpBackend::new(cfg)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_backend_needs_no_credentials() {
        assert!(create_backend(BackendConfig::File {
            dir: PathBuf::from("/tmp/pipewright-test"),
        })
        .is_ok());
    }

    #[test]
    fn test_cloud_backends_fail_fast_without_settings() {
        assert!(create_backend(BackendConfig::Vault(VaultConfig::default())).is_err());
        assert!(create_backend(BackendConfig::Aws(AwsConfig::default())).is_err());
        assert!(create_backend(BackendConfig::Azure(AzureConfig::default())).is_err());
        assert!(create_backend(BackendConfig::Gcp(GcpConfig::default())).is_err());
    }
}
