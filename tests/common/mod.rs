//! Fakes for the external collaborators of the pipeline

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use imagen_poe_bot::backend::{GenerateRequest, GeneratedImage, ImageBackend};
use imagen_poe_bot::error::{AppError, Result};
use imagen_poe_bot::pipeline::{
    Attachment, AttachmentSink, ChatMessage, ChatRequest, GenerationParams, ImageBatchGenerator,
    ImageBot, ImagePublisher, KeySource,
};
use imagen_poe_bot::storage::{ObjectStore, SignedUrl, StorageError, UrlSigner};

pub fn encoded(format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 8, Rgb([200, 40, 90]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

pub fn jpeg_image() -> GeneratedImage {
    GeneratedImage::Rendered {
        data: encoded(ImageFormat::Jpeg),
        mime_type: Some("image/jpeg".to_string()),
    }
}

pub fn filtered_image() -> GeneratedImage {
    GeneratedImage::Empty {
        reason: Some("filtered".to_string()),
    }
}

pub fn chat(prompt: &str) -> ChatRequest {
    ChatRequest {
        message_id: "msg-1".to_string(),
        messages: vec![
            ChatMessage {
                role: "user".to_string(),
                content: "earlier turn".to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            },
        ],
    }
}

pub enum Behaviour {
    Images(Vec<GeneratedImage>),
    Fail(String),
    Panic,
}

pub struct FakeBackend {
    behaviour: Mutex<Option<Behaviour>>,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl FakeBackend {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour: Mutex::new(Some(behaviour)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn returning(images: Vec<GeneratedImage>) -> Arc<Self> {
        Self::new(Behaviour::Images(images))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ImageBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<Vec<GeneratedImage>> {
        self.requests.lock().push(request);
        let behaviour = self.behaviour.lock().take();
        match behaviour {
            Some(Behaviour::Images(images)) => Ok(images),
            Some(Behaviour::Fail(message)) => Err(AppError::GenerationFailure(message)),
            Some(Behaviour::Panic) => panic!("model handle poisoned"),
            None => Err(AppError::Internal("generate called twice".to_string())),
        }
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub fail: bool,
    /// 1-based upload attempts that fail
    pub failing: Vec<usize>,
    pub attempts: Mutex<usize>,
    pub uploads: Mutex<Vec<(String, Vec<u8>, String)>>,
}

impl FakeStore {
    pub fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn failing_on(attempts: &[usize]) -> Arc<Self> {
        Arc::new(Self {
            failing: attempts.to_vec(),
            ..Self::default()
        })
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> std::result::Result<(), StorageError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            *attempts
        };
        if self.fail || self.failing.contains(&attempt) {
            return Err(StorageError::Upload {
                key: key.to_string(),
                message: "503 Service Unavailable".to_string(),
            });
        }
        self.uploads
            .lock()
            .push((key.to_string(), bytes, content_type.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSigner {
    pub fail: bool,
    pub signed: Mutex<Vec<(String, Duration)>>,
}

impl FakeSigner {
    pub fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }
}

#[async_trait]
impl UrlSigner for FakeSigner {
    async fn sign(&self, key: &str, ttl: Duration) -> std::result::Result<SignedUrl, StorageError> {
        if self.fail {
            return Err(StorageError::Misconfigured("iam.serviceAccounts.signBlob denied".to_string()));
        }
        self.signed.lock().push((key.to_string(), ttl));
        Ok(SignedUrl {
            url: format!("https://signed.example/{}?X-Goog-Signature=abc", key),
            expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    /// Number of leading posts that fail
    pub failures: usize,
    pub attempts: Mutex<usize>,
    pub posted: Mutex<Vec<(String, Attachment)>>,
}

impl RecordingSink {
    pub fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            ..Self::default()
        })
    }
}

#[async_trait]
impl AttachmentSink for RecordingSink {
    async fn post_attachment(&self, message_id: &str, attachment: &Attachment) -> Result<()> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            *attempts
        };
        if attempt <= self.failures {
            return Err(AppError::Attachment("Poe returned 502".to_string()));
        }
        self.posted
            .lock()
            .push((message_id.to_string(), attachment.clone()));
        Ok(())
    }
}

pub fn params() -> GenerationParams {
    GenerationParams {
        language: "en".to_string(),
        aspect_ratio: "1:1".to_string(),
        timeout: Duration::from_secs(5),
    }
}

pub fn bot(
    backend: Arc<FakeBackend>,
    store: Arc<FakeStore>,
    signer: Arc<FakeSigner>,
    sink: Arc<RecordingSink>,
) -> Arc<ImageBot> {
    let generator = ImageBatchGenerator::new(backend, params());
    let publisher = ImagePublisher::new(
        store,
        signer,
        KeySource::seeded(11),
        Duration::from_secs(3600),
    );
    Arc::new(ImageBot::new(generator, publisher, sink))
}
