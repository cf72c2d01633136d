//! HashiCorp Vault KV v2 backend

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    backend::SecretBackend,
    error::{Result, SecretError},
    types::SecretRecord,
};

/// Connection settings for Vault
#[derive(Debug, Clone, Default)]
pub struct VaultConfig {
    /// Vault address, e.g. `https://vault.internal:8200`
    pub address: Option<String>,
    /// Token sent as `X-Vault-Token`
    pub token: Option<String>,
    /// KV v2 mount point, defaults to `secret`
    pub mount: Option<String>,
    /// Request timeout, defaults to 10s
    pub timeout: Option<Duration>,
}

/// Token-authenticated Vault KV v2 client
#[derive(Debug)]
pub struct VaultBackend {
    client: reqwest::Client,
    address: String,
    token: String,
    mount: String,
}

#[derive(Deserialize)]
struct VaultReadResponse {
    data: VaultReadData,
}

#[derive(Deserialize)]
struct VaultReadData {
    data: SecretRecord,
}

#[derive(Deserialize)]
struct VaultListResponse {
    data: VaultListData,
}

#[derive(Deserialize)]
struct VaultListData {
    keys: Vec<String>,
}

impl VaultBackend {
    /// Fails fast when address or token are absent
    pub fn new(config: VaultConfig) -> Result<Self> {
        let address = config
            .address
            .filter(|a| !a.is_empty())
            .ok_or_else(|| SecretError::MissingConfiguration {
                backend: "Vault".to_string(),
                message: "address is required".to_string(),
            })?;
        let token = config
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SecretError::MissingConfiguration {
                backend: "Vault".to_string(),
                message: "token is required".to_string(),
            })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout.unwrap_or(Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            client,
            address: address.trim_end_matches('/').to_string(),
            token,
            mount: config.mount.unwrap_or_else(|| "secret".to_string()),
        })
    }

    fn data_url(&self, key: &str) -> String {
        format!("{}/v1/{}/data/{}", self.address, self.mount, key)
    }

    fn metadata_url(&self, key: &str) -> String {
        format!("{}/v1/{}/metadata/{}", self.address, self.mount, key)
    }
}

#[async_trait]
impl SecretBackend for VaultBackend {
    async fn put(&self, key: &str, record: &SecretRecord) -> Result<()> {
        let response = self
            .client
            .post(self.data_url(key))
            .header("X-Vault-Token", &self.token)
            .json(&json!({ "data": record }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("Vault write failed for {key}: {}", response.status()),
            });
        }
        debug!(key, "secret written to Vault");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretRecord>> {
        let response = self
            .client
            .get(self.data_url(key))
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("Vault read failed for {key}: {}", response.status()),
            });
        }
        let body: VaultReadResponse = response.json().await?;
        Ok(Some(body.data.data))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.metadata_url(key))
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(SecretError::Backend {
                message: format!("Vault delete failed for {key}: {}", response.status()),
            });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/{}/metadata?list=true", self.address, self.mount);
        let response = self
            .client
            .get(url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("Vault list failed: {}", response.status()),
            });
        }
        let body: VaultListResponse = response.json().await?;
        Ok(body.data.keys)
    }
}
