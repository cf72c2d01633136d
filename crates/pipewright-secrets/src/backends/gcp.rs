//! Google Secret Manager backend
//!
//! Prefers an instance-metadata-service token when one is reachable,
//! otherwise uses an explicitly configured access token, then drives the
//! versioned REST API (create secret, add version, access latest).

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    backend::SecretBackend,
    error::{Result, SecretError},
    types::SecretRecord,
};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Connection settings for GCP Secret Manager
#[derive(Debug, Clone, Default)]
pub struct GcpConfig {
    pub project_id: Option<String>,
    /// Explicit OAuth access token; fallback when no metadata service
    pub access_token: Option<String>,
    /// Override API base URL, used in tests
    pub api_base: Option<String>,
    /// Override metadata server URL, used in tests
    pub metadata_url: Option<String>,
    pub timeout: Option<Duration>,
}

/// REST client for Secret Manager
#[derive(Debug)]
pub struct GcpBackend {
    client: reqwest::Client,
    project_id: String,
    access_token: Option<String>,
    api_base: String,
    metadata_url: String,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: AccessPayload,
}

#[derive(Deserialize)]
struct AccessPayload {
    data: String,
}

#[derive(Deserialize)]
struct SecretList {
    #[serde(default)]
    secrets: Vec<ListedSecret>,
}

#[derive(Deserialize)]
struct ListedSecret {
    name: String,
}

impl GcpBackend {
    /// Fails fast when the project id is absent
    pub fn new(config: GcpConfig) -> Result<Self> {
        let project_id = config.project_id.filter(|p| !p.is_empty()).ok_or_else(|| {
            SecretError::MissingConfiguration {
                backend: "GCP Secret Manager".to_string(),
                message: "project id is required".to_string(),
            }
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout.unwrap_or(Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            client,
            project_id,
            access_token: config.access_token.filter(|t| !t.is_empty()),
            api_base: config
                .api_base
                .unwrap_or_else(|| "https://secretmanager.googleapis.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            metadata_url: config
                .metadata_url
                .unwrap_or_else(|| METADATA_TOKEN_URL.to_string()),
        })
    }

    async fn access_token(&self) -> Result<String> {
        // The metadata service answers fast or not at all; keep the probe short.
        let probe = self
            .client
            .get(&self.metadata_url)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        if let Ok(response) = probe {
            if response.status().is_success() {
                let token: MetadataToken = response.json().await?;
                debug!("using instance metadata token for GCP");
                return Ok(token.access_token);
            }
        }
        self.access_token
            .clone()
            .ok_or_else(|| SecretError::MissingConfiguration {
                backend: "GCP Secret Manager".to_string(),
                message: "no metadata service and no access token configured".to_string(),
            })
    }

    fn secret_name(&self, key: &str) -> String {
        format!("projects/{}/secrets/{key}", self.project_id)
    }
}

#[async_trait]
impl SecretBackend for GcpBackend {
    async fn put(&self, key: &str, record: &SecretRecord) -> Result<()> {
        let token = self.access_token().await?;

        // Create the secret container; AlreadyExists is fine.
        let create = self
            .client
            .post(format!(
                "{}/projects/{}/secrets?secretId={key}",
                self.api_base, self.project_id
            ))
            .bearer_auth(&token)
            .json(&json!({ "replication": { "automatic": {} } }))
            .send()
            .await?;
        if !create.status().is_success() && create.status() != reqwest::StatusCode::CONFLICT {
            return Err(SecretError::Backend {
                message: format!("GCP create failed for {key}: {}", create.status()),
            });
        }

        let data = general_purpose::STANDARD.encode(serde_json::to_string(record)?);
        let response = self
            .client
            .post(format!(
                "{}/{}:addVersion",
                self.api_base,
                self.secret_name(key)
            ))
            .bearer_auth(&token)
            .json(&json!({ "payload": { "data": data } }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("GCP write failed for {key}: {}", response.status()),
            });
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SecretRecord>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!(
                "{}/{}/versions/latest:access",
                self.api_base,
                self.secret_name(key)
            ))
            .bearer_auth(&token)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("GCP read failed for {key}: {}", response.status()),
            });
        }
        let body: AccessResponse = response.json().await?;
        let decoded = general_purpose::STANDARD.decode(body.payload.data)?;
        Ok(Some(serde_json::from_slice(&decoded)?))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let token = self.access_token().await?;
        let response = self
            .client
            .delete(format!("{}/{}", self.api_base, self.secret_name(key)))
            .bearer_auth(&token)
            .send()
            .await?;
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(SecretError::Backend {
                message: format!("GCP delete failed for {key}: {}", response.status()),
            });
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!(
                "{}/projects/{}/secrets",
                self.api_base, self.project_id
            ))
            .bearer_auth(&token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SecretError::Backend {
                message: format!("GCP list failed: {}", response.status()),
            });
        }
        let listed: SecretList = response.json().await?;
        Ok(listed
            .secrets
            .into_iter()
            .filter_map(|s| s.name.rsplit('/').next().map(|n| n.to_string()))
            .collect())
    }
}
