//! # Storefront Registry
//!
//! Versioned template storage and tenant site synchronization over an
//! S3-compatible object store:
//! - Template uploads become immutable versions under `{template}/{version}/`
//! - A per-template `latest` pointer, verified on every read
//! - Deploys copy a version into a tenant prefix and delete what it dropped
//! - Tenant data files regenerated from the owning backend
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storefront_registry::*;
//! use storefront_registry::storage::MemoryStorage;
//!
//! # async fn example(archive: bytes::Bytes) -> Result<()> {
//! let store = Arc::new(MemoryStorage::new());
//! let registry = Arc::new(Registry::new(
//!     store.clone(),
//!     RegistryConfig {
//!         bucket: "templates".into(),
//!         public_url: "https://templates.example.com".into(),
//!     },
//! ));
//!
//! registry
//!     .upload(UploadRequest {
//!         template_name: "storefront-classic".into(),
//!         archive,
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! let deployer = Deployer::new(
//!     store,
//!     registry,
//!     Arc::new(StaticDataSource::default()),
//!     DeployerConfig {
//!         templates_bucket: "templates".into(),
//!         stores_bucket: "stores".into(),
//!         platform_domain: "example.com".into(),
//!         images_bucket: None,
//!     },
//! );
//!
//! let result = deployer
//!     .deploy(DeployRequest {
//!         shop_id: "shop-1".into(),
//!         subdomain: "acme".into(),
//!         template_name: "storefront-classic".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("Deployed {} assets to {}", result.asset_count, result.url);
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod data_source;
pub mod deployer;
pub mod error;
pub mod lock;
pub mod registry;
pub mod storage;
pub mod sync;

pub use data_source::{StaticDataSource, StoreData, StoreDataSource};
pub use deployer::{
    CleanupResult, DataScope, DataUpdateResult, DeployRequest, Deployer, DeployerConfig,
    DeploymentMetadata, DeploymentResult, DeploymentStatus, RedeployRequest,
};
pub use error::{RegistryError, Result};
pub use registry::{
    DownloadInfo, PreviewImage, Registry, RegistryConfig, TemplateSummary, UploadOutcome,
    UploadRequest, VersionSummary,
};
pub use storage::{ObjectStore, StorageError};
pub use storefront::{AssetInfo, Manifest};

#[cfg(feature = "backend")]
pub use data_source::GraphQlDataSource;

#[cfg(feature = "s3")]
pub use storage::s3_storage::S3Storage;
