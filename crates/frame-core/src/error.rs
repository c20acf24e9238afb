//! Error types for frame

use crate::types::BackendKind;
use thiserror::Error;

/// Main error type for frame
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("No {kind} client is registered")]
    NoBackend { kind: BackendKind },

    #[error("{count} {kind} clients are registered, a name is required")]
    AmbiguousBackend { kind: BackendKind, count: usize },

    #[error("{kind} client '{name}' is not registered")]
    UnknownBackend { kind: BackendKind, name: String },

    #[error("Connection registry is not initialized")]
    RegistryNotReady,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl From<config::ConfigError> for FrameError {
    fn from(e: config::ConfigError) -> Self {
        match e {
            config::ConfigError::NotFound(key) => FrameError::ConfigNotFound(key),
            other => FrameError::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
