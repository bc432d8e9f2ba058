//! Versioned template storage
//!
//! Every version lives under `{template}/{version}/` in the templates
//! bucket. Assets are written first and the manifest last, so a version is
//! visible only once all of its assets exist. A plain-text `latest` pointer
//! per template is updated on a best-effort basis after each upload.

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use storefront::{Manifest, ManifestBuilder, ScratchWorkspace, content_type, manifest};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::address::{self, PREVIEWS_PREFIX, TemplateKeys};
use crate::error::{RegistryError, Result};
use crate::lock::KeyedLocks;
use crate::storage::{ObjectStore, PutOptions, StorageError};
use crate::sync::{SyncPlan, apply_removals, list_relative};

/// Where the registry keeps templates and how their previews are served
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub bucket: String,
    /// Public base URL of the templates bucket, used for thumbnail links
    pub public_url: String,
}

/// Preview image attached to an upload
#[derive(Debug, Clone)]
pub struct PreviewImage {
    pub file_name: String,
    pub data: Bytes,
}

/// One template upload
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub template_name: String,
    /// Timestamp-derived when absent or blank
    pub version: Option<String>,
    pub description: String,
    pub category: Option<String>,
    pub features: Vec<String>,
    /// Gzip-compressed tarball with a `build/` directory at its root
    pub archive: Bytes,
    pub preview_image: Option<PreviewImage>,
    /// Overwrite an existing version instead of skipping
    pub force: bool,
}

impl UploadRequest {
    pub fn archive_size(&self) -> u64 {
        self.archive.len() as u64
    }
}

#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// A manifest was written for this version
    Published {
        version: String,
        manifest_key: String,
        manifest: Manifest,
        /// Assets of an overwritten version that the new build dropped
        removed_count: usize,
    },
    /// The version already had a manifest and `force` was not set
    Skipped { version: String, manifest_key: String },
}

impl UploadOutcome {
    pub fn version(&self) -> &str {
        match self {
            Self::Published { version, .. } | Self::Skipped { version, .. } => version,
        }
    }
}

/// Version listing entry
#[derive(Debug, Clone, Serialize)]
pub struct VersionSummary {
    pub version: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub upload_time: OffsetDateTime,
    pub asset_count: usize,
    pub total_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    pub build_id: String,
    pub status: String,
    /// Key of the manifest, absent when it could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
}

impl VersionSummary {
    fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            upload_time: manifest.upload_time,
            asset_count: manifest.asset_count,
            total_size: manifest.total_size,
            git_commit: manifest.git_commit.clone(),
            build_id: manifest.build_id.clone(),
            status: "available".to_string(),
            manifest: Some(TemplateKeys::manifest(&manifest.template_name, &manifest.version)),
        }
    }

    /// A version directory whose manifest is missing or unreadable
    fn placeholder(version: &str) -> Self {
        Self {
            version: version.to_string(),
            description: String::new(),
            upload_time: OffsetDateTime::now_utc(),
            asset_count: 0,
            total_size: 0,
            git_commit: None,
            build_id: String::new(),
            status: "available".to_string(),
            manifest: None,
        }
    }

    pub fn has_manifest(&self) -> bool {
        self.manifest.is_some()
    }
}

/// Template listing entry, merged from the latest manifest's metadata
#[derive(Debug, Clone, Serialize)]
pub struct TemplateSummary {
    pub name: String,
    pub title: String,
    pub version: String,
    pub description: String,
    pub category: String,
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TemplateSummary {
    fn from_manifest(name: &str, manifest: &Manifest) -> Self {
        let features = manifest.features();
        Self {
            name: name.to_string(),
            title: manifest.title(),
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            category: manifest.category().unwrap_or("web").to_string(),
            features: if features.is_empty() {
                vec!["responsive".to_string(), "modern".to_string()]
            } else {
                features
            },
            thumbnail_url: manifest.thumbnail_url.clone(),
            preview_url: manifest.thumbnail_url.clone(),
            created_at: manifest.upload_time,
            updated_at: manifest.upload_time,
        }
    }

    fn unknown(name: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            name: name.to_string(),
            title: manifest::format_title(name),
            version: "unknown".to_string(),
            description: "No description available".to_string(),
            category: "web".to_string(),
            features: vec!["responsive".to_string()],
            thumbnail_url: None,
            preview_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Manifest of a version plus the keys of its assets
#[derive(Debug, Clone, Serialize)]
pub struct DownloadInfo {
    pub template: String,
    pub version: String,
    pub manifest: Manifest,
    pub asset_keys: Vec<String>,
}

/// Template registry over an object store
pub struct Registry<S: ObjectStore> {
    store: Arc<S>,
    config: RegistryConfig,
    locks: KeyedLocks,
}

impl<S: ObjectStore> Registry<S> {
    pub fn new(store: Arc<S>, config: RegistryConfig) -> Self {
        Self {
            store,
            config,
            locks: KeyedLocks::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Ingest an uploaded build as a new version
    #[instrument(skip(self, request), fields(template = %request.template_name, force = request.force))]
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome> {
        address::validate_template_name(&request.template_name)?;
        let version = match request.version.as_deref().map(str::trim) {
            Some(version) if !version.is_empty() => version.to_string(),
            _ => storefront::default_version(),
        };
        address::validate_version(&version)?;
        if request.archive.is_empty() {
            return Err(RegistryError::Validation("assets archive is empty".into()));
        }

        let template = request.template_name.clone();
        let bucket = self.config.bucket.as_str();
        let manifest_key = TemplateKeys::manifest(&template, &version);

        // Held across the existence check and every write of this version
        let _guard = self.locks.lock(&format!("{}/{}", template, version)).await;

        if !request.force && self.store.exists(bucket, &manifest_key).await? {
            info!(version = %version, "Template version already exists, skipping");
            return Ok(UploadOutcome::Skipped {
                version,
                manifest_key,
            });
        }

        info!(version = %version, archive_size = request.archive_size(), "Uploading template");

        let mut builder =
            ManifestBuilder::new(&template, &version).description(request.description.clone());
        if let Some(category) = &request.category {
            builder = builder.category(category.clone());
        }
        builder = builder.features(&request.features);

        let archive = request.archive.clone();
        let (workspace, build_root, mut manifest) =
            tokio::task::spawn_blocking(move || -> storefront::Result<_> {
                let workspace = ScratchWorkspace::unpack(&archive[..])?;
                let build_root = workspace.build_root()?;
                let manifest = builder.build(&build_root)?;
                Ok((workspace, build_root, manifest))
            })
            .await??;

        debug!(
            assets = manifest.asset_count,
            total_size = manifest.total_size,
            "Built manifest"
        );
        address::check_version_paths(manifest.asset_paths())?;

        if let Some(preview) = &request.preview_image {
            match self.upload_preview(&template, &version, preview).await {
                Ok(url) => manifest.thumbnail_url = Some(url),
                Err(e) => warn!(error = %e, "Preview image upload failed, continuing without thumbnail"),
            }
        }

        for asset in &manifest.assets {
            let data = tokio::fs::read(build_root.join(&asset.path)).await?;
            let key = TemplateKeys::asset(&template, &version, &asset.path);
            self.store
                .put(
                    bucket,
                    &key,
                    Bytes::from(data),
                    PutOptions::new().content_type(&asset.content_type),
                )
                .await?;
            debug!(key = %key, size = asset.size, "Uploaded asset");
        }
        drop(workspace);

        self.store
            .put(
                bucket,
                &manifest_key,
                Bytes::from(manifest.to_bytes()?),
                PutOptions::new().content_type("application/json"),
            )
            .await?;

        let mut removed_count = 0;
        if request.force {
            match self.remove_stale_assets(&manifest).await {
                Ok(removed) => removed_count = removed,
                Err(e) => warn!(error = %e, "Failed to remove assets dropped by forced upload"),
            }
        }

        if let Err(e) = self.update_latest(&template, &version).await {
            warn!(error = %e, "Failed to update latest version pointer");
        }

        info!(
            version = %version,
            assets = manifest.asset_count,
            total_size = manifest.total_size,
            removed_count,
            "Template uploaded"
        );

        Ok(UploadOutcome::Published {
            version,
            manifest_key,
            manifest,
            removed_count,
        })
    }

    async fn upload_preview(
        &self,
        template: &str,
        version: &str,
        preview: &PreviewImage,
    ) -> Result<String> {
        let epoch = OffsetDateTime::now_utc().unix_timestamp();
        let key = TemplateKeys::preview(template, version, epoch, &preview.file_name);

        self.store
            .put(
                &self.config.bucket,
                &key,
                preview.data.clone(),
                PutOptions::new().content_type(content_type::for_preview(&preview.file_name)),
            )
            .await?;

        debug!(key = %key, "Uploaded preview image");
        Ok(format!("{}/{}", self.config.public_url.trim_end_matches('/'), key))
    }

    /// Delete objects of a version directory that `manifest` does not list
    async fn remove_stale_assets(&self, manifest: &Manifest) -> Result<usize> {
        let prefix = TemplateKeys::version_prefix(&manifest.template_name, &manifest.version);
        let actual = list_relative(self.store.as_ref(), &self.config.bucket, &prefix)
            .await?
            .into_iter()
            .filter(|path| path != address::MANIFEST_FILE);

        let plan = SyncPlan::new(manifest.asset_paths(), actual);
        apply_removals(self.store.as_ref(), &self.config.bucket, &prefix, &plan.removals).await
    }

    async fn update_latest(&self, template: &str, version: &str) -> Result<()> {
        self.store
            .put(
                &self.config.bucket,
                &TemplateKeys::latest(template),
                Bytes::from(version.to_string()),
                PutOptions::new().content_type("text/plain"),
            )
            .await?;
        Ok(())
    }

    /// Load and validate the manifest of one version
    #[instrument(skip(self))]
    pub async fn get_manifest(&self, template: &str, version: &str) -> Result<Manifest> {
        address::validate_template_name(template)?;
        address::validate_version(version)?;

        let not_found = || RegistryError::VersionNotFound {
            template: template.to_string(),
            version: version.to_string(),
        };

        let bytes = match self
            .store
            .get(&self.config.bucket, &TemplateKeys::manifest(template, version))
            .await
        {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        Manifest::from_bytes(&bytes).map_err(|e| {
            warn!(error = %e, "Stored manifest is unreadable");
            not_found()
        })
    }

    /// Version the `latest` pointer names, or the newest readable version
    #[instrument(skip(self))]
    pub async fn resolve_latest(&self, template: &str) -> Result<String> {
        Ok(self.latest_manifest(template).await?.version)
    }

    /// Summary of the version `resolve_latest` returns
    pub async fn latest_version(&self, template: &str) -> Result<VersionSummary> {
        let manifest = self.latest_manifest(template).await?;
        Ok(VersionSummary::from_manifest(&manifest))
    }

    async fn latest_manifest(&self, template: &str) -> Result<Manifest> {
        address::validate_template_name(template)?;

        match self
            .store
            .get(&self.config.bucket, &TemplateKeys::latest(template))
            .await
        {
            Ok(bytes) => {
                let version = String::from_utf8_lossy(&bytes).trim().to_string();
                if address::validate_version(&version).is_ok() {
                    match self.get_manifest(template, &version).await {
                        Ok(manifest) => return Ok(manifest),
                        Err(RegistryError::VersionNotFound { .. }) => {
                            warn!(version = %version, "Latest pointer is dangling, scanning versions")
                        }
                        Err(e) => return Err(e),
                    }
                } else {
                    warn!("Latest pointer is empty or malformed, scanning versions");
                }
            }
            Err(StorageError::NotFound(_)) => debug!("No latest pointer, scanning versions"),
            Err(e) => return Err(e.into()),
        }

        let mut newest: Option<Manifest> = None;
        for version in self.version_names(template).await? {
            if let Ok(manifest) = self.get_manifest(template, &version).await {
                if newest
                    .as_ref()
                    .is_none_or(|current| manifest.upload_time > current.upload_time)
                {
                    newest = Some(manifest);
                }
            }
        }

        newest.ok_or_else(|| RegistryError::TemplateNotFound(template.to_string()))
    }

    /// Names of the version directories of a template
    async fn version_names(&self, template: &str) -> Result<Vec<String>> {
        let listing = self
            .store
            .list(
                &self.config.bucket,
                &TemplateKeys::template_prefix(template),
                Some("/"),
            )
            .await?;

        Ok(listing
            .common_prefixes
            .iter()
            .filter_map(|prefix| TemplateKeys::version_from_prefix(template, prefix))
            .map(str::to_string)
            .collect())
    }

    /// Every version of a template, newest upload first
    #[instrument(skip(self))]
    pub async fn list_versions(&self, template: &str) -> Result<Vec<VersionSummary>> {
        address::validate_template_name(template)?;

        let mut versions = Vec::new();
        for version in self.version_names(template).await? {
            let summary = match self.get_manifest(template, &version).await {
                Ok(manifest) => VersionSummary::from_manifest(&manifest),
                Err(RegistryError::VersionNotFound { .. }) => VersionSummary::placeholder(&version),
                Err(e) => return Err(e),
            };
            versions.push(summary);
        }

        versions.sort_by(|a, b| b.upload_time.cmp(&a.upload_time));
        Ok(versions)
    }

    /// Every template with metadata from its latest manifest, by name
    #[instrument(skip(self))]
    pub async fn list_templates(&self) -> Result<Vec<TemplateSummary>> {
        let listing = self.store.list(&self.config.bucket, "", Some("/")).await?;

        let mut templates = Vec::new();
        for prefix in &listing.common_prefixes {
            let name = prefix.trim_end_matches('/');
            if name.is_empty() || name == PREVIEWS_PREFIX {
                continue;
            }

            let summary = match self.latest_manifest(name).await {
                Ok(manifest) => TemplateSummary::from_manifest(name, &manifest),
                Err(e) => {
                    debug!(template = name, error = %e, "No readable manifest for template");
                    TemplateSummary::unknown(name)
                }
            };
            templates.push(summary);
        }

        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }

    /// Manifest and asset keys of one version
    pub async fn download(&self, template: &str, version: &str) -> Result<DownloadInfo> {
        let manifest = self.get_manifest(template, version).await?;
        let asset_keys = manifest
            .asset_paths()
            .map(|path| TemplateKeys::asset(template, version, path))
            .collect();

        Ok(DownloadInfo {
            template: template.to_string(),
            version: version.to_string(),
            manifest,
            asset_keys,
        })
    }
}
