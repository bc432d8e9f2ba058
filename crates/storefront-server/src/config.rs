//! Server configuration management

use crate::error::{ApiError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Deadline for uploads and deploys in seconds
    pub request_timeout_seconds: u64,

    /// Largest accepted request body
    pub max_upload_bytes: usize,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,

    pub templates_bucket: String,

    pub stores_bucket: String,

    /// Shop and product images, removed with a store when set
    pub images_bucket: Option<String>,

    /// Public base URL of the templates bucket
    pub public_url: String,

    /// Tenant sites are served below this domain
    pub platform_domain: String,

    /// Backend serving the tenant data GraphQL API
    pub backend_url: String,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: var_or("HOST", &defaults.host),
            port: var_or("PORT", "8080")
                .parse()
                .map_err(|_| ApiError::Config("Invalid PORT value".to_string()))?,
            request_timeout_seconds: var_or("REQUEST_TIMEOUT_SECONDS", "300")
                .parse()
                .map_err(|_| ApiError::Config("Invalid REQUEST_TIMEOUT_SECONDS value".to_string()))?,
            max_upload_bytes: var_or("MAX_UPLOAD_BYTES", "104857600")
                .parse()
                .map_err(|_| ApiError::Config("Invalid MAX_UPLOAD_BYTES value".to_string()))?,
            cors_origins: var_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            templates_bucket: var_or("TEMPLATES_BUCKET", &defaults.templates_bucket),
            stores_bucket: var_or("STORES_BUCKET", &defaults.stores_bucket),
            images_bucket: std::env::var("IMAGES_BUCKET")
                .ok()
                .map(|bucket| bucket.trim().to_string())
                .filter(|bucket| !bucket.is_empty()),
            public_url: var_or("PUBLIC_URL", &defaults.public_url),
            platform_domain: var_or("PLATFORM_DOMAIN", &defaults.platform_domain),
            backend_url: var_or("BACKEND_URL", &defaults.backend_url),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_seconds: 300,
            max_upload_bytes: 100 * 1024 * 1024,
            cors_origins: vec!["*".to_string()],
            templates_bucket: "templates".to_string(),
            stores_bucket: "stores".to_string(),
            images_bucket: None,
            public_url: "http://localhost:9000/templates".to_string(),
            platform_domain: "localhost".to_string(),
            backend_url: "http://localhost:8081".to_string(),
        }
    }
}
