//! Error types for the storefront registry and site synchronizer

use thiserror::Error;

use crate::storage::StorageError;

/// Registry and synchronizer errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Version {version} not found for template {template}")]
    VersionNotFound { template: String, version: String },

    #[error("Could not resolve a version for template {template}: {reason}")]
    VersionResolution { template: String, reason: String },

    #[error("No deployment found for {0}")]
    DeploymentNotFound(String),

    #[error("Archive error: {0}")]
    Archive(#[from] storefront::ArchiveError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] storefront::ManifestError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<storefront::StorefrontError> for RegistryError {
    fn from(err: storefront::StorefrontError) -> Self {
        match err {
            storefront::StorefrontError::Archive(e) => Self::Archive(e),
            storefront::StorefrontError::Manifest(e) => Self::Manifest(e),
        }
    }
}

impl RegistryError {
    /// True for errors caused by the caller's input rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Archive(storefront::ArchiveError::Malformed(_))
                | Self::Archive(storefront::ArchiveError::UnsafePath { .. })
                | Self::Archive(storefront::ArchiveError::MissingBuildRoot { .. })
        )
    }

    /// True for unknown templates, versions or tenants
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TemplateNotFound(_)
                | Self::VersionNotFound { .. }
                | Self::DeploymentNotFound(_)
                | Self::VersionResolution { .. }
        )
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
