//! Common traits and types for image generation backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Request to generate images
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The prompt to generate images from
    pub prompt: String,

    /// Number of images to generate
    pub n: u32,

    /// Prompt language hint
    pub language: String,

    /// Output aspect ratio, e.g. "1:1"
    pub aspect_ratio: String,
}

/// One image returned by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    /// Encoded pixel data as returned by the model
    Rendered {
        data: Vec<u8>,
        mime_type: Option<String>,
    },
    /// Placeholder without pixel data, e.g. removed by a safety filter
    Empty { reason: Option<String> },
}

impl GeneratedImage {
    pub fn rendered(data: Vec<u8>) -> Self {
        Self::Rendered {
            data,
            mime_type: None,
        }
    }
}

/// Trait for image generation backends
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Generate a batch of images in a single call
    async fn generate(&self, request: GenerateRequest) -> Result<Vec<GeneratedImage>>;
}
