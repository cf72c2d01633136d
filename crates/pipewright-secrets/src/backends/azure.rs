//! Azure Key Vault backend
//!
//! OAuth2 client-credentials token exchange against Entra ID, then the
//! versioned Key Vault REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    backend::SecretBackend,
    error::{Result, SecretError},
    types::SecretRecord,
};

const API_VERSION: &str = "7.4";

/// Connection settings for Azure Key Vault
#[derive(Debug, Clone, Default)]
pub struct AzureConfig {
    /// Vault URL, e.g. `https://myvault.vault.azure.net`
    pub vault_url: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Override token endpoint, used in tests
    pub token_endpoint: Option<String>,
    pub timeout: Option<Duration>,
}

/// Client-credentials authenticated Key Vault client
#[derive(Debug)]
pub struct AzureBackend {
    client: reqwest::Client,
    vault_url: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    token_endpoint: Option<String>,
    cached_token: RwLock<Option<CachedToken>>,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

#[derive(Deserialize)]
struct SecretListResponse {
    #[serde(default)]
    value: Vec<SecretItem>,
}

#[derive(Deserialize)]
struct SecretItem {
    id: String,
}

impl AzureBackend {
    /// Fails fast when vault URL or credentials are absent
    pub fn new(config: AzureConfig) -> Result<Self> {
        let missing = |field: &str| SecretError::MissingConfiguration {
            backend: "Azure Key Vault".to_string(),
            message: format!("{field} is required"),
        };
        let vault_url = config
            .vault_url
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing("vault url"))?;
        let tenant_id = config
            .tenant_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing("tenant id"))?;
        let client_id = config
            .client_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing("client id"))?;
        let client_secret = config
            .client_secret
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing("client secret"))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout.unwrap_or(Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            client,
            vault_url: vault_url.trim_end_matches('/').to_string(),
            tenant_id,
            client_id,
            client_secret,
            token_endpoint: config.token_endpoint,
            cached_token: RwLock::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() {
                    return Ok(token.token.clone());
                }
            }
        }

        let endpoint = self.token_endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.tenant_id
            )
        });
        let response = self
            .client
            .post(endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", "https://vault.azure.net/.default"),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("Azure token exchange failed: {}", response.status()),
            });
        }
        let token: TokenResponse = response.json().await?;
        debug!("Azure access token refreshed");

        let expires_at =
            Utc::now() + chrono::Duration::seconds(token.expires_in.unwrap_or(3600) - 60);
        let mut cached = self.cached_token.write().await;
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    fn secret_url(&self, key: &str) -> String {
        format!(
            "{}/secrets/{key}?api-version={API_VERSION}",
            self.vault_url
        )
    }
}

#[async_trait]
impl SecretBackend for AzureBackend {
    async fn put(&self, key: &str, record: &SecretRecord) -> Result<()> {
        let token = self.access_token().await?;
        let response = self
            .client
            .put(self.secret_url(key))
            .bearer_auth(token)
            .json(&json!({ "value": serde_json::to_string(record)? }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("Azure write failed for {key}: {}", response.status()),
            });
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretRecord>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(self.secret_url(key))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("Azure read failed for {key}: {}", response.status()),
            });
        }
        let bundle: SecretBundle = response.json().await?;
        Ok(Some(serde_json::from_str(&bundle.value)?))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let token = self.access_token().await?;
        let response = self
            .client
            .delete(self.secret_url(key))
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(SecretError::Backend {
                message: format!("Azure delete failed for {key}: {}", response.status()),
            });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!(
                "{}/secrets?api-version={API_VERSION}",
                self.vault_url
            ))
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("Azure list failed: {}", response.status()),
            });
        }
        let listed: SecretListResponse = response.json().await?;
        Ok(listed
            .value
            .into_iter()
            .filter_map(|item| item.id.rsplit('/').next().map(|s| s.to_string()))
            .collect())
    }
}
