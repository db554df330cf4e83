//! Ambient identity: short-lived OAuth tokens for Google APIs

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::CredentialsConfig;
use crate::error::{AppError, Result};

const DEFAULT_METADATA_HOST: &str = "http://metadata.google.internal";
const SERVICE_ACCOUNT_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default";

/// A bearer token together with its remaining lifetime
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Option<Duration>,
}

/// Source of delegated credentials for outbound Google API calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a fresh access token
    async fn access_token(&self) -> Result<AccessToken>;

    /// Email of the identity the tokens belong to
    async fn service_account_email(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Reads tokens from the compute metadata server of the running instance
pub struct MetadataTokenProvider {
    client: Client,
    base_url: String,
}

impl MetadataTokenProvider {
    pub fn new(metadata_host: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let host = metadata_host.unwrap_or(DEFAULT_METADATA_HOST);
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };

        Ok(Self { client, base_url })
    }

    async fn get(&self, suffix: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}{}", self.base_url, SERVICE_ACCOUNT_PATH, suffix);
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AuthenticationFailed(format!(
                "Metadata server returned {}: {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl TokenProvider for MetadataTokenProvider {
    async fn access_token(&self) -> Result<AccessToken> {
        let token: MetadataToken = self.get("/token").await?.json().await?;
        debug!(expires_in = ?token.expires_in, "Fetched access token from metadata server");

        Ok(AccessToken {
            token: token.access_token,
            expires_in: token.expires_in.map(Duration::from_secs),
        })
    }

    async fn service_account_email(&self) -> Result<String> {
        let email = self.get("/email").await?.text().await?;
        Ok(email.trim().to_string())
    }
}

/// Serves a fixed token, for local runs and tests
pub struct StaticTokenProvider {
    token: String,
    email: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, email: Option<String>) -> Self {
        Self {
            token: token.into(),
            email,
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<AccessToken> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_in: None,
        })
    }

    async fn service_account_email(&self) -> Result<String> {
        self.email.clone().ok_or_else(|| {
            AppError::AuthenticationFailed(
                "No service account configured for URL signing".to_string(),
            )
        })
    }
}

/// Pick the token source described by the configuration
pub fn from_config(config: &CredentialsConfig) -> Result<std::sync::Arc<dyn TokenProvider>> {
    match &config.access_token {
        Some(token) if !token.trim().is_empty() => Ok(std::sync::Arc::new(
            StaticTokenProvider::new(token.trim(), config.service_account.clone()),
        )),
        _ => Ok(std::sync::Arc::new(MetadataTokenProvider::new(
            config.metadata_host.as_deref(),
        )?)),
    }
}
