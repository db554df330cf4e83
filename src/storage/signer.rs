//! V4 signed URLs whose signature comes from the IAM Credentials API
//!
//! The process never holds a private key: the string to sign is sent to
//! `signBlob` on behalf of the ambient service account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::StorageConfig;
use crate::credentials::TokenProvider;
use crate::error::{AppError, Result};
use crate::response::base64;
use crate::storage::{SignedUrl, StorageError, UrlSigner};

const ALGORITHM: &str = "GOOG4-RSA-SHA256";

/// Signs read URLs for objects in one bucket
pub struct IamUrlSigner {
    client: Client,
    iam_endpoint: String,
    storage_endpoint: String,
    bucket: String,
    tokens: Arc<dyn TokenProvider>,
}

#[derive(Debug, Serialize)]
struct SignBlobRequest {
    payload: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobResponse {
    #[serde(default)]
    key_id: Option<String>,
    signed_blob: String,
}

impl IamUrlSigner {
    pub fn new(config: &StorageConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            iam_endpoint: config.iam_endpoint.trim_end_matches('/').to_string(),
            storage_endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            tokens,
        })
    }

    async fn sign_blob(&self, key: &str, email: &str, payload: &str) -> std::result::Result<Vec<u8>, StorageError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| StorageError::Credentials(e.to_string()))?;

        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:signBlob",
            self.iam_endpoint, email
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token.token)
            .json(&SignBlobRequest {
                payload: base64::encode(payload.as_bytes()),
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StorageError::Timeout(e.to_string())
                } else {
                    StorageError::Signing {
                        key: key.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::from_status(key, status, body, true));
        }

        let signed: SignBlobResponse = response.json().await.map_err(|e| StorageError::Signing {
            key: key.to_string(),
            message: format!("unreadable signBlob response: {}", e),
        })?;
        debug!(key_id = ?signed.key_id, "Blob signed");

        base64::decode(&signed.signed_blob).map_err(|e| StorageError::Signing {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl UrlSigner for IamUrlSigner {
    async fn sign(&self, key: &str, ttl: Duration) -> std::result::Result<SignedUrl, StorageError> {
        let email = self
            .tokens
            .service_account_email()
            .await
            .map_err(|e| StorageError::Credentials(e.to_string()))?;

        let now = Utc::now();
        let (scheme, host) = split_endpoint(&self.storage_endpoint);
        let path = object_path(&self.bucket, key);
        let query = canonical_query(&email, now, ttl);
        let request = canonical_request(host, &path, &query);
        let to_sign = string_to_sign(now, &request);

        let signature = hex::encode(self.sign_blob(key, &email, &to_sign).await?);
        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .map_err(|e| StorageError::Misconfigured(format!("invalid TTL: {}", e)))?;

        Ok(SignedUrl {
            url: format!(
                "{}://{}{}?{}&X-Goog-Signature={}",
                scheme, host, path, query, signature
            ),
            expires_at,
        })
    }
}

fn split_endpoint(endpoint: &str) -> (&str, &str) {
    endpoint.split_once("://").unwrap_or(("https", endpoint))
}

fn object_path(bucket: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("/{}/{}", bucket, encoded.join("/"))
}

fn credential_scope(now: DateTime<Utc>) -> String {
    format!("{}/auto/storage/goog4_request", now.format("%Y%m%d"))
}

/// Query parameters in the sorted order the signature covers
fn canonical_query(email: &str, now: DateTime<Utc>, ttl: Duration) -> String {
    let credential = format!("{}/{}", email, credential_scope(now));
    [
        ("X-Goog-Algorithm", ALGORITHM.to_string()),
        ("X-Goog-Credential", credential),
        ("X-Goog-Date", now.format("%Y%m%dT%H%M%SZ").to_string()),
        ("X-Goog-Expires", ttl.as_secs().to_string()),
        ("X-Goog-SignedHeaders", "host".to_string()),
    ]
    .iter()
    .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
    .collect::<Vec<_>>()
    .join("&")
}

fn canonical_request(host: &str, path: &str, query: &str) -> String {
    format!(
        "GET\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
        path, query, host
    )
}

fn string_to_sign(now: DateTime<Utc>, canonical_request: &str) -> String {
    let digest = Sha256::digest(canonical_request.as_bytes());
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        now.format("%Y%m%dT%H%M%SZ"),
        credential_scope(now),
        hex::encode(digest)
    )
}
