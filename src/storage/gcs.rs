//! Cloud Storage uploads through the JSON API

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use crate::config::StorageConfig;
use crate::credentials::TokenProvider;
use crate::error::{AppError, Result};
use crate::storage::{ObjectStore, StorageError};

/// Bucket handle shared by all in-flight requests
pub struct GcsObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GcsObjectStore {
    pub fn new(config: &StorageConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            tokens,
        })
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> std::result::Result<(), StorageError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| StorageError::Credentials(e.to_string()))?;

        let url = format!("{}/upload/storage/v1/b/{}/o", self.endpoint, self.bucket);
        let size = bytes.len();

        let response = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", key)])
            .bearer_auth(&token.token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StorageError::Timeout(e.to_string())
                } else {
                    StorageError::Upload {
                        key: key.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::from_status(key, status, body, false));
        }

        debug!(bucket = %self.bucket, key = %key, size, "Uploaded object");
        Ok(())
    }
}
