//! Vertex AI Imagen backend client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::traits::{GenerateRequest, GeneratedImage, ImageBackend};
use crate::config::VertexConfig;
use crate::credentials::TokenProvider;
use crate::error::{AppError, Result};
use crate::response::base64;

/// Imagen served through the Vertex AI `:predict` endpoint
pub struct VertexBackend {
    name: String,
    client: Client,
    predict_url: String,
    tokens: Arc<dyn TokenProvider>,
}

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<PredictInstance>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance {
    prompt: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    language: String,
    aspect_ratio: String,
    include_rai_reason: bool,
    output_options: OutputOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions {
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

impl VertexBackend {
    /// Create a new Vertex backend from configuration
    pub fn new(config: &VertexConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let predict_url = format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            config.endpoint(),
            config.project_id,
            config.location,
            config.model
        );

        Ok(Self {
            name: config.model.clone(),
            client,
            predict_url,
            tokens,
        })
    }

    fn convert(index: usize, prediction: Prediction) -> GeneratedImage {
        let Some(encoded) = prediction.bytes_base64_encoded else {
            return GeneratedImage::Empty {
                reason: prediction.rai_filtered_reason,
            };
        };

        match base64::decode(&encoded) {
            Ok(data) => GeneratedImage::Rendered {
                data,
                mime_type: prediction.mime_type,
            },
            Err(e) => {
                warn!(index = index + 1, error = %e, "Prediction carried undecodable image bytes");
                GeneratedImage::Empty {
                    reason: Some(e.to_string()),
                }
            }
        }
    }
}

#[async_trait]
impl ImageBackend for VertexBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: GenerateRequest) -> Result<Vec<GeneratedImage>> {
        let token = self.tokens.access_token().await?;

        let body = PredictRequest {
            instances: vec![PredictInstance {
                prompt: request.prompt,
            }],
            parameters: PredictParameters {
                sample_count: request.n,
                language: request.language,
                aspect_ratio: request.aspect_ratio,
                include_rai_reason: true,
                output_options: OutputOptions {
                    mime_type: "image/jpeg".to_string(),
                },
            },
        };

        debug!(backend = %self.name, samples = request.n, "Sending predict request");

        let response = self
            .client
            .post(&self.predict_url)
            .bearer_auth(&token.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("Vertex AI request timed out: {}", e))
                } else {
                    AppError::GenerationFailure(format!("Vertex AI request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GenerationFailure(format!(
                "Vertex AI returned {}: {}",
                status, body
            )));
        }

        let payload: PredictResponse = response.json().await.map_err(|e| {
            AppError::GenerationFailure(format!("Failed to parse Vertex AI response: {}", e))
        })?;

        Ok(payload
            .predictions
            .into_iter()
            .enumerate()
            .map(|(index, prediction)| Self::convert(index, prediction))
            .collect())
    }
}
