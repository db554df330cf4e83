//! Request pipeline - directive parsing, generation, publishing and streaming

pub mod directive;
pub mod generator;
pub mod orchestrator;
pub mod publisher;

pub use directive::Directive;
pub use generator::{GenerationParams, ImageBatchGenerator};
pub use orchestrator::{AttachmentSink, ChatMessage, ChatRequest, ImageBot, PartialResponse};
pub use publisher::{Attachment, ImagePublisher, KeySource, PublishedArtifact};
