//! Per-image publishing: signed link when storage works, raw attachment otherwise

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::backend::GeneratedImage;
use crate::response::jpeg;
use crate::storage::{ObjectStore, SignedUrl, StorageError, UrlSigner};

pub const OBJECT_KEY_LEN: usize = 24;
const PROMPT_PREFIX_CHARS: usize = 10;

/// Randomness used to name stored objects
pub struct KeySource {
    rng: Mutex<StdRng>,
}

impl KeySource {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// A fresh `<24 alphanumerics>.jpg` object key
    pub fn object_key(&self) -> String {
        let mut rng = self.rng.lock();
        let stem: String = (&mut *rng)
            .sample_iter(&Alphanumeric)
            .take(OBJECT_KEY_LEN)
            .map(char::from)
            .collect();
        format!("{}.jpg", stem)
    }
}

/// JPEG bytes to hand to the chat transport directly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Outcome of publishing one generated image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishedArtifact {
    Link {
        filename: String,
        url: String,
        expires_at: DateTime<Utc>,
    },
    Attachment(Attachment),
}

/// Human-readable attachment name: first characters of the prompt plus the batch index
pub fn display_filename(prompt: &str, index: usize) -> String {
    let prefix: String = prompt
        .chars()
        .take(PROMPT_PREFIX_CHARS)
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    format!("{}_image_{}.jpg", prefix, index)
}

pub struct ImagePublisher {
    store: Arc<dyn ObjectStore>,
    signer: Arc<dyn UrlSigner>,
    keys: KeySource,
    ttl: Duration,
}

impl ImagePublisher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        signer: Arc<dyn UrlSigner>,
        keys: KeySource,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            signer,
            keys,
            ttl,
        }
    }

    /// Publish one image; `index` is 1-based within the batch.
    ///
    /// Returns `None` when the image carries no usable pixel data.
    pub async fn publish(
        &self,
        image: GeneratedImage,
        prompt: &str,
        index: usize,
    ) -> Option<PublishedArtifact> {
        let data = match image {
            GeneratedImage::Rendered { data, .. } if !data.is_empty() => data,
            GeneratedImage::Rendered { .. } => {
                warn!(index, "Image {} could not be generated. Skipping...", index);
                return None;
            }
            GeneratedImage::Empty { reason } => {
                warn!(index, reason = ?reason, "Image {} could not be generated. Skipping...", index);
                return None;
            }
        };

        let bytes = match jpeg::to_jpeg(data).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(index, error = %e, "Image {} has no usable pixel data. Skipping...", index);
                return None;
            }
        };

        let filename = display_filename(prompt, index);
        let key = self.keys.object_key();

        match self.publish_remote(&key, bytes.clone()).await {
            Ok(SignedUrl { url, expires_at }) => {
                info!(index, key = %key, %expires_at, "Published image as signed link");
                Some(PublishedArtifact::Link {
                    filename,
                    url,
                    expires_at,
                })
            }
            Err(e) => {
                if e.is_configuration() {
                    error!(index, key = %key, error = %e, "Storage rejected the image, attaching it instead");
                } else {
                    warn!(index, key = %key, error = %e, "Storage unavailable, attaching image instead");
                }
                Some(PublishedArtifact::Attachment(Attachment { filename, bytes }))
            }
        }
    }

    async fn publish_remote(&self, key: &str, bytes: Vec<u8>) -> Result<SignedUrl, StorageError> {
        self.store.upload(key, bytes, jpeg::CONTENT_TYPE).await?;
        self.signer.sign(key, self.ttl).await
    }
}
