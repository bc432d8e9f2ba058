use std::path::PathBuf;
use storefront_registry::RegistryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Template directory not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    #[error("Build of template {template} failed: {message}")]
    Build { template: String, message: String },

    #[error("Failed to walk build output: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<storefront_registry::StorageError> for WorkerError {
    fn from(err: storefront_registry::StorageError) -> Self {
        Self::Registry(err.into())
    }
}

impl WorkerError {
    /// Errors of the queue connection itself, worth a pause before retrying
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Queue(_))
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
