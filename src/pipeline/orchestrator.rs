//! Per-request flow from chat message to streamed partial responses

use async_stream::stream;
use async_trait::async_trait;
use futures::{FutureExt, Stream};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::pipeline::directive::Directive;
use crate::pipeline::generator::ImageBatchGenerator;
use crate::pipeline::publisher::{Attachment, ImagePublisher, PublishedArtifact};

pub const PROMPT_REQUIRED: &str = "Prompt is required";
pub const NO_IMAGES: &str = "No images were generated. Please modify your prompt or try again later.";

/// One prior chat turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Inbound chat request; only the last message is read
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message_id: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn last_content(&self) -> &str {
        self.messages
            .last()
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }
}

/// Unit of output delivered to the chat transport, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialResponse {
    Text(String),
    /// An image that was already posted through the [`AttachmentSink`]
    Attachment(Attachment),
}

impl PartialResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn error(err: &AppError) -> Self {
        Self::Text(format!("Error: {}", err))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Attachment(_) => None,
        }
    }
}

/// Transport-side delivery of binary attachments
#[async_trait]
pub trait AttachmentSink: Send + Sync {
    async fn post_attachment(&self, message_id: &str, attachment: &Attachment) -> Result<()>;
}

pub fn link_markdown(filename: &str, url: &str) -> String {
    format!("![Generated Image_{}]({})", filename, url)
}

/// Poe appends consecutive text events, so anything after a link starts a new paragraph
pub fn continued(response: PartialResponse, follows_text: bool) -> PartialResponse {
    match response {
        PartialResponse::Text(text) if follows_text => PartialResponse::Text(format!("\n\n{}", text)),
        other => other,
    }
}

pub fn attachment_summary(count: usize, prompt: &str) -> String {
    format!(
        "{} image(s) generated by Imagen3 attached for \"{}\".",
        count, prompt
    )
}

pub struct ImageBot {
    generator: ImageBatchGenerator,
    publisher: ImagePublisher,
    attachments: Arc<dyn AttachmentSink>,
}

impl ImageBot {
    pub fn new(
        generator: ImageBatchGenerator,
        publisher: ImagePublisher,
        attachments: Arc<dyn AttachmentSink>,
    ) -> Self {
        Self {
            generator,
            publisher,
            attachments,
        }
    }

    /// Lazily run the pipeline for one request.
    ///
    /// Every failure ends the stream with a single text response; nothing is
    /// propagated to the caller.
    pub fn respond(self: Arc<Self>, request: ChatRequest) -> impl Stream<Item = PartialResponse> + Send + 'static {
        let span = info_span!(
            "respond",
            request_id = %Uuid::new_v4(),
            message_id = %request.message_id
        );

        stream! {
            let directive = match Directive::parse(request.last_content()) {
                Ok(directive) => directive,
                Err(AppError::EmptyPrompt) => {
                    info!(parent: &span, "Empty prompt");
                    yield PartialResponse::text(PROMPT_REQUIRED);
                    return;
                }
                Err(e) => {
                    error!(parent: &span, error = %e, "Error processing the request");
                    yield PartialResponse::error(&e);
                    return;
                }
            };
            info!(parent: &span, prompt = %directive.prompt, count = directive.count, "Parsed prompt");

            let images = match guarded(self.generator.generate(&directive)).instrument(span.clone()).await {
                Ok(Ok(images)) => images,
                Ok(Err(AppError::NoImagesProduced)) => {
                    warn!(parent: &span, "Generation returned no images");
                    yield PartialResponse::text(NO_IMAGES);
                    return;
                }
                Ok(Err(e)) | Err(e) => {
                    error!(parent: &span, error = %e, "Error processing the request");
                    yield PartialResponse::error(&e);
                    return;
                }
            };

            let mut links = 0usize;
            let mut queued: Vec<Attachment> = Vec::new();

            for (position, image) in images.into_iter().enumerate() {
                let index = position + 1;
                let published = guarded(self.publisher.publish(image, &directive.prompt, index))
                    .instrument(span.clone())
                    .await;

                match published {
                    Ok(Some(PublishedArtifact::Link { filename, url, .. })) => {
                        yield continued(PartialResponse::text(link_markdown(&filename, &url)), links > 0);
                        links += 1;
                    }
                    Ok(Some(PublishedArtifact::Attachment(attachment))) => queued.push(attachment),
                    Ok(None) => {}
                    Err(e) => {
                        error!(parent: &span, index, error = %e, "Error processing the request");
                        yield continued(PartialResponse::error(&e), links > 0);
                        return;
                    }
                }
            }

            if queued.is_empty() {
                if links == 0 {
                    warn!(parent: &span, "Every generated image was skipped");
                    yield PartialResponse::text(NO_IMAGES);
                }
                return;
            }

            let total = queued.len();
            let mut delivered = 0usize;
            for attachment in queued {
                let posted = guarded(self.attachments.post_attachment(&request.message_id, &attachment))
                    .instrument(span.clone())
                    .await;

                match posted {
                    Ok(Ok(())) => {
                        delivered += 1;
                        yield PartialResponse::Attachment(attachment);
                    }
                    Ok(Err(e)) => {
                        error!(parent: &span, filename = %attachment.filename, error = %e, "Failed to post attachment");
                    }
                    Err(e) => {
                        error!(parent: &span, error = %e, "Error processing the request");
                        yield continued(PartialResponse::error(&e), links > 0);
                        return;
                    }
                }
            }

            if delivered == 0 {
                let e = AppError::Attachment(format!("none of the {} images could be delivered", total));
                yield continued(PartialResponse::error(&e), links > 0);
                return;
            }

            info!(parent: &span, delivered, total, "Attachments delivered");
            yield continued(PartialResponse::text(attachment_summary(delivered, &directive.prompt)), links > 0);
        }
    }
}

/// Run a pipeline step, turning a panic into an [`AppError::Internal`]
async fn guarded<F, T>(step: F) -> Result<T>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(step)
        .catch_unwind()
        .await
        .map_err(|panic| AppError::Internal(panic_message(panic)))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected panic".to_string()
    }
}
