//! AWS Secrets Manager backend
//!
//! Speaks the signed JSON 1.1 protocol directly: POST with an
//! `X-Amz-Target` action header and a SigV4 `Authorization` header.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::{
    backend::SecretBackend,
    error::{Result, SecretError},
    types::SecretRecord,
};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "secretsmanager";

/// Connection settings for AWS Secrets Manager
#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Override endpoint, used in tests; defaults to the regional endpoint
    pub endpoint: Option<String>,
    pub timeout: Option<Duration>,
}

/// Signed-JSON client for Secrets Manager
#[derive(Debug)]
pub struct AwsBackend {
    client: reqwest::Client,
    region: String,
    access_key_id: String,
    secret_access_key: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct GetSecretValueResponse {
    #[serde(rename = "SecretString")]
    secret_string: String,
}

#[derive(Deserialize)]
struct ListSecretsResponse {
    #[serde(rename = "SecretList", default)]
    secret_list: Vec<ListedSecret>,
}

#[derive(Deserialize)]
struct ListedSecret {
    #[serde(rename = "Name")]
    name: String,
}

impl AwsBackend {
    /// Fails fast when region or credentials are absent
    pub fn new(config: AwsConfig) -> Result<Self> {
        let missing = |field: &str| SecretError::MissingConfiguration {
            backend: "AWS Secrets Manager".to_string(),
            message: format!("{field} is required"),
        };
        let region = config
            .region
            .filter(|r| !r.is_empty())
            .ok_or_else(|| missing("region"))?;
        let access_key_id = config
            .access_key_id
            .filter(|k| !k.is_empty())
            .ok_or_else(|| missing("access key id"))?;
        let secret_access_key = config
            .secret_access_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| missing("secret access key"))?;
        let endpoint = config
            .endpoint
            .unwrap_or_else(|| format!("https://secretsmanager.{region}.amazonaws.com"));
        let client = reqwest::Client::builder()
            .timeout(config.timeout.unwrap_or(Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            client,
            region,
            access_key_id,
            secret_access_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, action: &str, body: Value) -> Result<(reqwest::StatusCode, String)> {
        let body = body.to_string();
        let now = chrono::Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let target = format!("secretsmanager.{action}");
        let host = self
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();

        let payload_hash = hex::encode(Sha256::digest(body.as_bytes()));
        let canonical_headers = format!(
            "content-type:application/x-amz-json-1.1\nhost:{host}\nx-amz-date:{amz_date}\nx-amz-target:{target}\n"
        );
        let signed_headers = "content-type;host;x-amz-date;x-amz-target";
        let canonical_request =
            format!("POST\n/\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}");

        let credential_scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = derive_signing_key(
            &self.secret_access_key,
            &date_stamp,
            &self.region,
            SERVICE,
        );
        let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes()));
        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key_id
        );

        let response = self
            .client
            .post(format!("{}/", self.endpoint))
            .header("Content-Type", "application/x-amz-json-1.1")
            .header("X-Amz-Date", amz_date)
            .header("X-Amz-Target", target)
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }

    fn error_type(body: &str) -> Option<String> {
        serde_json::from_str::<Value>(body)
            .ok()?
            .get("__type")?
            .as_str()
            .map(|s| s.to_string())
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

#[async_trait]
impl SecretBackend for AwsBackend {
    async fn put(&self, key: &str, record: &SecretRecord) -> Result<()> {
        let secret_string = serde_json::to_string(record)?;
        let (status, body) = self
            .call(
                "PutSecretValue",
                json!({ "SecretId": key, "SecretString": secret_string }),
            )
            .await?;
        if status.is_success() {
            return Ok(());
        }
        // First write for this key: create the secret instead.
        if Self::error_type(&body).is_some_and(|t| t.contains("ResourceNotFoundException")) {
            let (status, body) = self
                .call(
                    "CreateSecret",
                    json!({ "Name": key, "SecretString": secret_string }),
                )
                .await?;
            if status.is_success() {
                return Ok(());
            }
            return Err(SecretError::Backend {
                message: format!("AWS create failed for {key}: {status} {body}"),
            });
        }
        Err(SecretError::Backend {
            message: format!("AWS write failed for {key}: {status} {body}"),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<SecretRecord>> {
        let (status, body) = self
            .call("GetSecretValue", json!({ "SecretId": key }))
            .await?;
        if !status.is_success() {
            if Self::error_type(&body).is_some_and(|t| t.contains("ResourceNotFoundException")) {
                return Ok(None);
            }
            return Err(SecretError::Backend {
                message: format!("AWS read failed for {key}: {status} {body}"),
            });
        }
        let parsed: GetSecretValueResponse = serde_json::from_str(&body)?;
        Ok(Some(serde_json::from_str(&parsed.secret_string)?))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let (status, body) = self
            .call(
                "DeleteSecret",
                json!({ "SecretId": key, "ForceDeleteWithoutRecovery": true }),
            )
            .await?;
        if status.is_success()
            || Self::error_type(&body).is_some_and(|t| t.contains("ResourceNotFoundException"))
        {
            return Ok(());
        }
        Err(SecretError::Backend {
            message: format!("AWS delete failed for {key}: {status} {body}"),
        })
    }

    async fn list(&self) -> Result<Vec<String>> {
        let (status, body) = self.call("ListSecrets", json!({})).await?;
        if !status.is_success() {
            return Err(SecretError::Backend {
                message: format!("AWS list failed: {status} {body}"),
            });
        }
        let parsed: ListSecretsResponse = serde_json::from_str(&body)?;
        Ok(parsed.secret_list.into_iter().map(|s| s.name).collect())
    }
}
