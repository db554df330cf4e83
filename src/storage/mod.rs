//! Remote object storage: uploads and time-bounded signed URLs

pub mod gcs;
pub mod signer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

pub use gcs::GcsObjectStore;
pub use signer::IamUrlSigner;

/// Failure while publishing an object
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("signing URL for {key} failed: {message}")]
    Signing { key: String, message: String },

    #[error("storage request timed out: {0}")]
    Timeout(String),

    /// Rejected for reasons that will not go away on their own (bad bucket, missing permission)
    #[error("storage misconfigured: {0}")]
    Misconfigured(String),
}

impl StorageError {
    /// Whether the failure points at configuration rather than a transient remote fault
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Misconfigured(_) | Self::Credentials(_))
    }

    pub(crate) fn from_status(key: &str, status: reqwest::StatusCode, body: String, signing: bool) -> Self {
        if matches!(status.as_u16(), 400 | 401 | 403 | 404) {
            return Self::Misconfigured(format!("{} returned {}: {}", key, status, body));
        }
        let message = format!("{}: {}", status, body);
        if signing {
            Self::Signing { key: key.to_string(), message }
        } else {
            Self::Upload { key: key.to_string(), message }
        }
    }
}

/// A URL granting temporary read access to one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Write access to the bucket that holds published images
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;
}

/// Mints read URLs for stored objects
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn sign(&self, key: &str, ttl: Duration) -> Result<SignedUrl, StorageError>;
}
