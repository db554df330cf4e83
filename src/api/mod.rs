//! Poe-facing HTTP surface

pub mod attachment;
pub mod protocol;
pub mod routes;

pub use attachment::PoeAttachmentClient;
