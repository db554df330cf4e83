//! Backend module - Generation trait and the Vertex AI client

pub mod traits;
pub mod vertex;

pub use traits::{GenerateRequest, GeneratedImage, ImageBackend};
pub use vertex::VertexBackend;
