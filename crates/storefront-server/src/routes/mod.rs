//! HTTP route handlers

pub mod deployments;
pub mod templates;

use std::future::Future;
use std::time::Duration;
use storefront_registry::RegistryError;

use crate::error::{ApiError, Result};

/// Run a registry operation under the request deadline
pub(crate) async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, RegistryError>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| ApiError::Timeout)?
        .map_err(ApiError::from)
}
