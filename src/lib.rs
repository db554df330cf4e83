//! Imagen bot for Poe
//!
//! Turns a chat message into one or more Imagen images and streams them back
//! as signed Cloud Storage links, falling back to binary attachments when
//! publishing fails.

pub mod api;
pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod response;
pub mod storage;

pub use error::{AppError, Result};

use std::sync::Arc;

use api::PoeAttachmentClient;
use backend::VertexBackend;
use pipeline::{GenerationParams, ImageBatchGenerator, ImageBot, ImagePublisher, KeySource};
use storage::{GcsObjectStore, IamUrlSigner};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub bot: Arc<ImageBot>,
}

impl AppState {
    /// Wire the production collaborators described by `settings`
    pub fn from_settings(settings: config::Settings) -> Result<Self> {
        let tokens = credentials::from_config(&settings.credentials)?;

        let backend = Arc::new(VertexBackend::new(&settings.vertex, tokens.clone())?);
        let generator = ImageBatchGenerator::new(backend, GenerationParams::from(&settings.vertex));

        let store = Arc::new(GcsObjectStore::new(&settings.storage, tokens.clone())?);
        let signer = Arc::new(IamUrlSigner::new(&settings.storage, tokens)?);
        let publisher = ImagePublisher::new(
            store,
            signer,
            KeySource::from_entropy(),
            settings.storage.signed_url_ttl(),
        );

        let attachments = Arc::new(PoeAttachmentClient::new(
            &settings.poe,
            settings.auth.access_key.clone(),
        )?);

        Ok(Self {
            bot: Arc::new(ImageBot::new(generator, publisher, attachments)),
            settings: Arc::new(settings),
        })
    }
}
