//! Error types for the storefront core library
//!
//! Errors are split by domain: unpacking an uploaded build archive and
//! building or validating a template manifest.

use thiserror::Error;

/// Main error type for the storefront core library
#[derive(Error, Debug)]
pub enum StorefrontError {
    /// Archive extraction errors (malformed or unsafe input)
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Manifest construction and validation errors
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

/// Errors raised while unpacking a compressed build archive
///
/// Uploaded archives are untrusted input, so anything that would write
/// outside the scratch workspace is rejected rather than skipped.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to read archive: {0}")]
    Malformed(#[source] std::io::Error),

    #[error("Archive entry escapes the workspace: {path}")]
    UnsafePath { path: String },

    #[error("Build directory '{dir}' not found in uploaded archive")]
    MissingBuildRoot { dir: String },

    #[error("Failed to prepare scratch workspace: {0}")]
    Workspace(#[source] std::io::Error),
}

/// Errors raised while building or validating a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Invalid asset path: {0}")]
    InvalidAssetPath(String),

    #[error("Duplicate asset path: {0}")]
    DuplicateAsset(String),

    #[error("Asset count mismatch: manifest says {declared}, found {actual}")]
    AssetCountMismatch { declared: usize, actual: usize },

    #[error("Total size mismatch: manifest says {declared}, assets sum to {actual}")]
    TotalSizeMismatch { declared: u64, actual: u64 },

    #[error("Manifest checksum mismatch")]
    ChecksumMismatch,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Failed to read build directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
