//! Binary attachments posted back to Poe for a bot message

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::PoeConfig;
use crate::error::{AppError, Result};
use crate::pipeline::{Attachment, AttachmentSink};
use crate::response::jpeg;

pub struct PoeAttachmentClient {
    client: Client,
    url: String,
    access_key: String,
}

impl PoeAttachmentClient {
    pub fn new(config: &PoeConfig, access_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.attachment_url.clone(),
            access_key,
        })
    }
}

#[async_trait]
impl AttachmentSink for PoeAttachmentClient {
    async fn post_attachment(&self, message_id: &str, attachment: &Attachment) -> Result<()> {
        let file = Part::bytes(attachment.bytes.clone())
            .file_name(attachment.filename.clone())
            .mime_str(jpeg::CONTENT_TYPE)?;

        let form = Form::new()
            .text("message_id", message_id.to_string())
            .text("is_inline", "false")
            .part("file", file);

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::AUTHORIZATION, &self.access_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Attachment(format!(
                "Poe returned {}: {}",
                status, body
            )));
        }

        debug!(message_id = %message_id, filename = %attachment.filename, "Attachment posted");
        Ok(())
    }
}
