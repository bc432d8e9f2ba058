//! Tenant site synchronization
//!
//! A deploy copies every asset of a template version into the tenant's
//! prefix of the stores bucket, deletes objects the version no longer
//! contains and rewrites the tenant data files under `{subdomain}/data/`.
//! Data files are never touched by reconciliation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use storefront::Manifest;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::address::{self, ImageKeys, SiteKeys, TemplateKeys};
use crate::data_source::StoreDataSource;
use crate::error::{RegistryError, Result};
use crate::lock::KeyedLocks;
use crate::registry::Registry;
use crate::storage::{
    IMMUTABLE_CACHE_CONTROL, NO_CACHE_CONTROL, ObjectStore, PutOptions, StorageError,
};
use crate::sync::{SyncPlan, apply_removals, list_relative};

pub const SHOP_FILE: &str = "shop.json";
pub const PRODUCTS_FILE: &str = "products.json";
pub const SETTINGS_FILE: &str = "settings.json";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone)]
pub struct DeployerConfig {
    pub templates_bucket: String,
    pub stores_bucket: String,
    /// Sites are served at `https://{subdomain}.{platform_domain}`
    pub platform_domain: String,
    /// Bucket holding shop and product images, swept on cleanup when set
    pub images_bucket: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeployRequest {
    pub shop_id: String,
    pub subdomain: String,
    pub template_name: String,
    /// Latest version when absent or blank
    #[serde(default)]
    pub version: Option<String>,
    /// Merged into `settings.json`
    #[serde(default)]
    pub data_override: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedeployRequest {
    pub shop_id: String,
    #[serde(default)]
    pub subdomain: String,
    /// Currently deployed template when absent
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Which tenant data files a data-only refresh rewrites
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataScope {
    #[default]
    All,
    Shop,
    Products,
}

impl DataScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Shop => "shop",
            Self::Products => "products",
        }
    }

    /// Data files written for this scope, metadata included
    pub fn files(&self) -> Vec<&'static str> {
        match self {
            Self::All => vec![SHOP_FILE, PRODUCTS_FILE, SETTINGS_FILE, METADATA_FILE],
            Self::Shop => vec![SHOP_FILE, METADATA_FILE],
            Self::Products => vec![PRODUCTS_FILE, METADATA_FILE],
        }
    }
}

impl FromStr for DataScope {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "all" => Ok(Self::All),
            "shop" => Ok(Self::Shop),
            "products" => Ok(Self::Products),
            other => Err(RegistryError::Validation(format!(
                "Invalid data_type: {}. Valid values are 'shop', 'products', or 'all'",
                other
            ))),
        }
    }
}

/// Contents of `{subdomain}/data/metadata.json`, the tenant's record of
/// what is live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMetadata {
    pub template_name: String,
    pub template_version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub deployed_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_type: Option<DataScope>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    pub status: String,
    pub message: String,
    pub deployment_id: Uuid,
    pub shop_id: String,
    pub subdomain: String,
    pub template: String,
    pub version: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub deployed_at: OffsetDateTime,
    pub asset_count: usize,
    pub total_size: u64,
    /// Objects of the previous deploy that the new version does not contain
    pub removed_count: usize,
    pub deploy_time: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataUpdateResult {
    pub status: String,
    pub message: String,
    pub subdomain: String,
    pub data_type: DataScope,
    pub updated_files: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentStatus {
    pub subdomain: String,
    pub status: String,
    pub template_name: String,
    pub template_version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub deployed_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// Whether the site's root document exists
    pub accessible: bool,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResult {
    pub status: String,
    pub subdomain: String,
    pub shop_id: String,
    pub removed_count: usize,
    /// Shop and product images deleted from the images bucket
    pub removed_images: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub cleaned_at: OffsetDateTime,
}

/// Deploys template versions into tenant prefixes
pub struct Deployer<S: ObjectStore, D: StoreDataSource> {
    store: Arc<S>,
    registry: Arc<Registry<S>>,
    data: Arc<D>,
    config: DeployerConfig,
    locks: KeyedLocks,
}

impl<S: ObjectStore, D: StoreDataSource> Deployer<S, D> {
    pub fn new(
        store: Arc<S>,
        registry: Arc<Registry<S>>,
        data: Arc<D>,
        config: DeployerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            data,
            config,
            locks: KeyedLocks::new(),
        }
    }

    pub fn site_url(&self, subdomain: &str) -> String {
        format!("https://{}.{}", subdomain, self.config.platform_domain)
    }

    /// Deploy a template version to a tenant
    #[instrument(skip(self, request), fields(subdomain = %request.subdomain, template = %request.template_name))]
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeploymentResult> {
        validate_shop_id(&request.shop_id)?;
        address::validate_subdomain(&request.subdomain)?;
        address::validate_template_name(&request.template_name)?;

        let _guard = self.locks.lock(&request.subdomain).await;
        self.deploy_locked(request).await
    }

    /// Deploy again, by default the template and version currently live
    #[instrument(skip(self, request), fields(subdomain = %request.subdomain))]
    pub async fn redeploy(&self, request: RedeployRequest) -> Result<DeploymentResult> {
        validate_shop_id(&request.shop_id)?;
        address::validate_subdomain(&request.subdomain)?;

        let _guard = self.locks.lock(&request.subdomain).await;

        let requested_template = request
            .template_name
            .filter(|template| !template.trim().is_empty());
        let (template_name, version) = match requested_template {
            Some(template) => (template, request.version),
            None => {
                let current = self.read_metadata(&request.subdomain).await?;
                let version = request
                    .version
                    .filter(|version| !version.trim().is_empty())
                    .or(Some(current.template_version));
                (current.template_name, version)
            }
        };
        address::validate_template_name(&template_name)?;

        let data_override = self.read_settings(&request.subdomain).await;
        self.deploy_locked(DeployRequest {
            shop_id: request.shop_id,
            subdomain: request.subdomain,
            template_name,
            version,
            data_override,
        })
        .await
    }

    async fn deploy_locked(&self, request: DeployRequest) -> Result<DeploymentResult> {
        let started = Instant::now();
        let subdomain = request.subdomain.as_str();
        let template = request.template_name.as_str();

        let version = match request.version.as_deref().map(str::trim) {
            Some(version) if !version.is_empty() => version.to_string(),
            _ => self
                .registry
                .resolve_latest(template)
                .await
                .map_err(|e| match e {
                    RegistryError::TemplateNotFound(_) | RegistryError::VersionNotFound { .. } => {
                        RegistryError::VersionResolution {
                            template: template.to_string(),
                            reason: e.to_string(),
                        }
                    }
                    other => other,
                })?,
        };

        let manifest = self
            .registry
            .get_manifest(template, &version)
            .await
            .map_err(|e| match e {
                RegistryError::VersionNotFound { template, version } => {
                    RegistryError::TemplateNotFound(format!("{}@{}", template, version))
                }
                other => other,
            })?;

        address::check_site_paths(manifest.asset_paths())?;

        info!(version = %version, assets = manifest.asset_count, "Deploying template");

        let data = self.data.fetch_all(&request.shop_id, subdomain).await?;

        self.copy_assets(subdomain, &manifest).await?;
        let removed_count = self.remove_stale(subdomain, &manifest).await?;

        let deployed_at = OffsetDateTime::now_utc();
        self.write_data_file(subdomain, SHOP_FILE, &data.shop).await?;
        self.write_data_file(subdomain, PRODUCTS_FILE, &data.products)
            .await?;
        self.write_data_file(subdomain, SETTINGS_FILE, &request.data_override)
            .await?;
        self.write_data_file(
            subdomain,
            METADATA_FILE,
            &DeploymentMetadata {
                template_name: template.to_string(),
                template_version: version.clone(),
                deployed_at,
                last_updated: deployed_at,
                last_update_type: None,
            },
        )
        .await?;

        let elapsed = started.elapsed();
        info!(
            version = %version,
            assets = manifest.asset_count,
            removed_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "Deployment complete"
        );

        Ok(DeploymentResult {
            status: "success".to_string(),
            message: "Store deployed successfully".to_string(),
            deployment_id: Uuid::new_v4(),
            shop_id: request.shop_id.clone(),
            subdomain: subdomain.to_string(),
            template: template.to_string(),
            version,
            url: self.site_url(subdomain),
            deployed_at,
            asset_count: manifest.asset_count,
            total_size: manifest.total_size,
            removed_count,
            deploy_time: format!("{:.2}s", elapsed.as_secs_f64()),
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    /// Server-side copy of every manifest asset, in manifest order
    async fn copy_assets(&self, subdomain: &str, manifest: &Manifest) -> Result<()> {
        for asset in &manifest.assets {
            let source = TemplateKeys::asset(&manifest.template_name, &manifest.version, &asset.path);
            let destination = SiteKeys::asset(subdomain, &asset.path);

            self.store
                .copy(
                    &self.config.templates_bucket,
                    &source,
                    &self.config.stores_bucket,
                    &destination,
                    PutOptions::new()
                        .content_type(&asset.content_type)
                        .cache_control(IMMUTABLE_CACHE_CONTROL),
                )
                .await?;
            debug!(source = %source, destination = %destination, "Copied asset");
        }
        Ok(())
    }

    /// Delete tenant objects outside the manifest, leaving `data/` alone
    async fn remove_stale(&self, subdomain: &str, manifest: &Manifest) -> Result<usize> {
        let prefix = SiteKeys::prefix(subdomain);
        let actual = list_relative(self.store.as_ref(), &self.config.stores_bucket, &prefix)
            .await?
            .into_iter()
            .filter(|path| !address::is_data_path(path));

        let plan = SyncPlan::new(manifest.asset_paths(), actual);
        if !plan.removals.is_empty() {
            info!(count = plan.removals.len(), "Removing stale assets");
        }
        apply_removals(
            self.store.as_ref(),
            &self.config.stores_bucket,
            &prefix,
            &plan.removals,
        )
        .await
    }

    async fn write_data_file<T: Serialize + ?Sized>(
        &self,
        subdomain: &str,
        file: &str,
        value: &T,
    ) -> Result<()> {
        let key = SiteKeys::data_file(subdomain, file);
        self.store
            .put(
                &self.config.stores_bucket,
                &key,
                Bytes::from(serde_json::to_vec_pretty(value)?),
                PutOptions::new()
                    .content_type("application/json")
                    .cache_control(NO_CACHE_CONTROL),
            )
            .await?;
        debug!(key = %key, "Wrote data file");
        Ok(())
    }

    /// Rewrite tenant data files without touching template assets
    #[instrument(skip(self, shop_id))]
    pub async fn update_data(
        &self,
        shop_id: &str,
        subdomain: &str,
        scope: DataScope,
    ) -> Result<DataUpdateResult> {
        validate_shop_id(shop_id)?;
        address::validate_subdomain(subdomain)?;

        let _guard = self.locks.lock(subdomain).await;
        let current = self.read_metadata(subdomain).await?;

        match scope {
            DataScope::All => {
                let data = self.data.fetch_all(shop_id, subdomain).await?;
                let settings = self.read_settings(subdomain).await;
                self.write_data_file(subdomain, SHOP_FILE, &data.shop).await?;
                self.write_data_file(subdomain, PRODUCTS_FILE, &data.products)
                    .await?;
                self.write_data_file(subdomain, SETTINGS_FILE, &settings)
                    .await?;
            }
            DataScope::Shop => {
                let shop = self.data.fetch_shop(shop_id, subdomain).await?;
                self.write_data_file(subdomain, SHOP_FILE, &shop).await?;
            }
            DataScope::Products => {
                let products = self.data.fetch_products(shop_id, subdomain).await?;
                self.write_data_file(subdomain, PRODUCTS_FILE, &products)
                    .await?;
            }
        }

        let updated_at = OffsetDateTime::now_utc();
        let metadata = DeploymentMetadata {
            last_updated: updated_at,
            last_update_type: Some(scope),
            ..current
        };
        if let Err(e) = self.write_data_file(subdomain, METADATA_FILE, &metadata).await {
            warn!(error = %e, "Failed to update deployment metadata");
        }

        info!(data_type = scope.as_str(), "Store data updated");
        Ok(DataUpdateResult {
            status: "success".to_string(),
            message: format!("Store data updated successfully ({})", scope.as_str()),
            subdomain: subdomain.to_string(),
            data_type: scope,
            updated_files: scope.files().into_iter().map(str::to_string).collect(),
            updated_at,
        })
    }

    /// What is live for a tenant and whether its root document exists
    #[instrument(skip(self))]
    pub async fn status(&self, subdomain: &str) -> Result<DeploymentStatus> {
        address::validate_subdomain(subdomain)?;
        let metadata = self.read_metadata(subdomain).await?;

        let accessible = match self
            .store
            .exists(&self.config.stores_bucket, &SiteKeys::root_document(subdomain))
            .await
        {
            Ok(exists) => exists,
            Err(e) => {
                warn!(error = %e, "Root document check failed");
                false
            }
        };

        Ok(DeploymentStatus {
            subdomain: subdomain.to_string(),
            status: "deployed".to_string(),
            template_name: metadata.template_name,
            template_version: metadata.template_version,
            deployed_at: metadata.deployed_at,
            last_updated: metadata.last_updated,
            accessible,
            url: self.site_url(subdomain),
        })
    }

    /// Delete every object of a tenant, data files included, and the shop's
    /// images when an images bucket is configured
    #[instrument(skip(self))]
    pub async fn cleanup(&self, shop_id: &str, subdomain: &str) -> Result<CleanupResult> {
        validate_shop_id(shop_id)?;
        address::validate_shop_segment(shop_id)?;
        address::validate_subdomain(subdomain)?;

        let _guard = self.locks.lock(subdomain).await;
        let prefix = SiteKeys::prefix(subdomain);
        let existing =
            list_relative(self.store.as_ref(), &self.config.stores_bucket, &prefix).await?;
        let removed_count = apply_removals(
            self.store.as_ref(),
            &self.config.stores_bucket,
            &prefix,
            &existing,
        )
        .await?;

        info!(removed_count, "Store files cleaned up");

        let mut removed_images = 0;
        if let Some(bucket) = &self.config.images_bucket {
            for prefix in [ImageKeys::shop_prefix(shop_id), ImageKeys::products_prefix(shop_id)] {
                let existing = list_relative(self.store.as_ref(), bucket, &prefix).await?;
                removed_images +=
                    apply_removals(self.store.as_ref(), bucket, &prefix, &existing).await?;
            }
            info!(removed_images, "Shop images cleaned up");
        }

        Ok(CleanupResult {
            status: "success".to_string(),
            subdomain: subdomain.to_string(),
            shop_id: shop_id.to_string(),
            removed_count,
            removed_images,
            cleaned_at: OffsetDateTime::now_utc(),
        })
    }

    /// Current deployment record of a tenant
    pub async fn read_metadata(&self, subdomain: &str) -> Result<DeploymentMetadata> {
        let key = SiteKeys::data_file(subdomain, METADATA_FILE);
        let bytes = match self.store.get(&self.config.stores_bucket, &key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                return Err(RegistryError::DeploymentNotFound(subdomain.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(error = %e, "Deployment metadata is unreadable");
            RegistryError::DeploymentNotFound(subdomain.to_string())
        })
    }

    /// Settings currently deployed, empty when absent or not a string map
    async fn read_settings(&self, subdomain: &str) -> BTreeMap<String, String> {
        let key = SiteKeys::data_file(subdomain, SETTINGS_FILE);
        let Ok(bytes) = self.store.get(&self.config.stores_bucket, &key).await else {
            return BTreeMap::new();
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k, v.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}

fn validate_shop_id(shop_id: &str) -> Result<()> {
    if shop_id.trim().is_empty() {
        return Err(RegistryError::Validation(
            "Missing required field: shop_id".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_scope_parsing() {
        assert_eq!("".parse::<DataScope>().unwrap(), DataScope::All);
        assert_eq!("all".parse::<DataScope>().unwrap(), DataScope::All);
        assert_eq!("shop".parse::<DataScope>().unwrap(), DataScope::Shop);
        assert_eq!("products".parse::<DataScope>().unwrap(), DataScope::Products);
        assert!(matches!(
            "orders".parse::<DataScope>(),
            Err(RegistryError::Validation(_))
        ));
    }

    #[test]
    fn test_metadata_round_trip_shape() {
        let json = r#"{
            "template_name": "classic",
            "template_version": "v1",
            "deployed_at": "2024-05-01T12:00:00Z",
            "last_updated": "2024-05-02T08:30:00Z",
            "last_update_type": "products"
        }"#;

        let metadata: DeploymentMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.template_version, "v1");
        assert_eq!(metadata.last_update_type, Some(DataScope::Products));

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["deployed_at"], "2024-05-01T12:00:00Z");
        assert_eq!(value["last_update_type"], "products");
    }

    #[test]
    fn test_scope_files() {
        assert_eq!(DataScope::Shop.files(), vec![SHOP_FILE, METADATA_FILE]);
        assert_eq!(DataScope::All.files().len(), 4);
    }
}
