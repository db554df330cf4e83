//! Configuration module

pub mod settings;

pub use settings::{
    AuthConfig, CredentialsConfig, LoggingConfig, PoeConfig, ServerConfig, Settings,
    StorageConfig, VertexConfig,
};
