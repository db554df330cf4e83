//! Single-attempt batch generation on top of an [`ImageBackend`]

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{GenerateRequest, GeneratedImage, ImageBackend};
use crate::config::VertexConfig;
use crate::error::{AppError, Result};
use crate::pipeline::directive::Directive;

/// Fixed generation parameters that users cannot influence
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub language: String,
    pub aspect_ratio: String,
    pub timeout: Duration,
}

impl From<&VertexConfig> for GenerationParams {
    fn from(config: &VertexConfig) -> Self {
        Self {
            language: config.language.clone(),
            aspect_ratio: config.aspect_ratio.clone(),
            timeout: config.timeout(),
        }
    }
}

pub struct ImageBatchGenerator {
    backend: Arc<dyn ImageBackend>,
    params: GenerationParams,
}

impl ImageBatchGenerator {
    pub fn new(backend: Arc<dyn ImageBackend>, params: GenerationParams) -> Self {
        Self { backend, params }
    }

    /// Run one generation call for the whole batch.
    ///
    /// Errors are never retried. An empty result is reported as
    /// [`AppError::NoImagesProduced`].
    pub async fn generate(&self, directive: &Directive) -> Result<Vec<GeneratedImage>> {
        let request = GenerateRequest {
            prompt: directive.prompt.clone(),
            n: directive.count,
            language: self.params.language.clone(),
            aspect_ratio: self.params.aspect_ratio.clone(),
        };

        info!(backend = %self.backend.name(), count = directive.count, "Generating images");

        let images = match tokio::time::timeout(self.params.timeout, self.backend.generate(request)).await {
            Ok(Ok(images)) => images,
            Ok(Err(e @ AppError::GenerationFailure(_))) => return Err(e),
            Ok(Err(e)) => return Err(AppError::GenerationFailure(e.to_string())),
            Err(_) => {
                return Err(AppError::GenerationFailure(format!(
                    "Image generation timed out after {}s",
                    self.params.timeout.as_secs()
                )))
            }
        };

        if images.is_empty() {
            return Err(AppError::NoImagesProduced);
        }

        // Fewer than requested is fine; extras are dropped
        let mut images = images;
        images.truncate(directive.count as usize);

        debug!(returned = images.len(), "Generation finished");
        Ok(images)
    }
}
