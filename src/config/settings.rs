//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest validity a V4 signed URL may carry (7 days).
pub const MAX_SIGNED_URL_TTL_SECS: u64 = 604_800;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub vertex: VertexConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub poe: PoeConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Poe access key; inbound requests must present it as a bearer token
    #[serde(default)]
    pub access_key: String,
}

/// Vertex AI image generation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VertexConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    /// Overrides `https://{location}-aiplatform.googleapis.com`
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_ms: u64,
}

fn default_model() -> String {
    "imagen-3.0-generate-001".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

fn default_generation_timeout() -> u64 {
    120000
}

impl VertexConfig {
    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.location),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Cloud Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,
    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_iam_endpoint")]
    pub iam_endpoint: String,
    #[serde(default = "default_storage_timeout")]
    pub timeout_ms: u64,
}

fn default_signed_url_ttl() -> u64 {
    3600
}

fn default_storage_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_iam_endpoint() -> String {
    "https://iamcredentials.googleapis.com".to_string()
}

fn default_storage_timeout() -> u64 {
    30000
}

impl StorageConfig {
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Ambient identity configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CredentialsConfig {
    /// Metadata server base URL; defaults to `http://metadata.google.internal`
    #[serde(default)]
    pub metadata_host: Option<String>,
    /// Fixed OAuth token for local runs without a metadata server
    #[serde(default)]
    pub access_token: Option<String>,
    /// Service account used for URL signing when a static token is configured
    #[serde(default)]
    pub service_account: Option<String>,
}

/// Poe transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoeConfig {
    #[serde(default = "default_attachment_url")]
    pub attachment_url: String,
    #[serde(default = "default_introduction")]
    pub introduction_message: String,
    #[serde(default = "default_attachment_timeout")]
    pub timeout_ms: u64,
}

fn default_attachment_url() -> String {
    "https://www.quora.com/poe_api/file_attachment_3RD_PARTY_POST".to_string()
}

fn default_introduction() -> String {
    "Describe an image. Add --number_of_images=N (1-4) to get several.".to_string()
}

fn default_attachment_timeout() -> u64 {
    30000
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("auth.access_key", "")?
            .set_default("vertex.project_id", "")?
            .set_default("vertex.location", "")?
            .set_default("storage.bucket", "")?
            .set_default("poe.attachment_url", default_attachment_url())?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            // Load from configuration file
            .add_source(File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false))
            // Override with environment variables (prefixed with IMAGEN_BOT__)
            .add_source(
                Environment::with_prefix("IMAGEN_BOT")
                    .separator("__")
                    .try_parsing(true),
            )
            // The deployment's bare variables take precedence
            .set_override_option("vertex.project_id", non_empty_env("PROJECT_ID"))?
            .set_override_option("vertex.location", non_empty_env("LOCATION"))?
            .set_override_option("auth.access_key", non_empty_env("POE_ACCESS_KEY"))?
            .set_override_option("storage.bucket", non_empty_env("BUCKET_NAME"))?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        require(&self.vertex.project_id, "PROJECT_ID")?;
        require(&self.vertex.location, "LOCATION")?;
        require(&self.auth.access_key, "POE_ACCESS_KEY")?;
        require(&self.storage.bucket, "BUCKET_NAME")?;

        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0".to_string()));
        }

        if self.vertex.model.trim().is_empty() {
            return Err(invalid("Vertex model name cannot be empty".to_string()));
        }

        if self.storage.signed_url_ttl_secs == 0
            || self.storage.signed_url_ttl_secs > MAX_SIGNED_URL_TTL_SECS
        {
            return Err(invalid(format!(
                "Signed URL TTL must be between 1 and {} seconds, got {}",
                MAX_SIGNED_URL_TTL_SECS, self.storage.signed_url_ttl_secs
            )));
        }

        if self.vertex.timeout_ms == 0 || self.storage.timeout_ms == 0 || self.poe.timeout_ms == 0 {
            return Err(invalid("Timeouts must be greater than zero".to_string()));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "Invalid log format '{}'. Must be 'json' or 'pretty'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn require(value: &str, variable: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{} environment variable is not set.", variable)));
    }
    Ok(())
}

fn invalid(message: String) -> AppError {
    AppError::Config(config::ConfigError::Message(message))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            auth: AuthConfig {
                access_key: String::new(),
            },
            vertex: VertexConfig {
                project_id: String::new(),
                location: String::new(),
                model: default_model(),
                language: default_language(),
                aspect_ratio: default_aspect_ratio(),
                endpoint: None,
                timeout_ms: default_generation_timeout(),
            },
            storage: StorageConfig {
                bucket: String::new(),
                signed_url_ttl_secs: default_signed_url_ttl(),
                endpoint: default_storage_endpoint(),
                iam_endpoint: default_iam_endpoint(),
                timeout_ms: default_storage_timeout(),
            },
            credentials: CredentialsConfig::default(),
            poe: PoeConfig {
                attachment_url: default_attachment_url(),
                introduction_message: default_introduction(),
                timeout_ms: default_attachment_timeout(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
