//! Request and response bodies of the HTTP API
use serde::{Deserialize, Serialize};
use storefront_registry::{DownloadInfo, Manifest, UploadOutcome, VersionSummary};
use time::OffsetDateTime;

pub const SUCCESS: &str = "success";
pub const SKIPPED: &str = "skipped";

/// Result of `POST /templates/upload`
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub message: String,
    pub template_name: String,
    pub version: String,
    pub manifest_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_count: Option<usize>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl UploadResponse {
    pub fn new(template_name: &str, outcome: UploadOutcome) -> Self {
        let timestamp = OffsetDateTime::now_utc();
        match outcome {
            UploadOutcome::Published {
                version,
                manifest_key,
                manifest,
                removed_count,
            } => Self {
                status: SUCCESS,
                message: "Template uploaded successfully".to_string(),
                template_name: template_name.to_string(),
                version,
                manifest_key,
                asset_count: Some(manifest.asset_count),
                total_size: Some(manifest.total_size),
                removed_count: Some(removed_count),
                timestamp,
            },
            UploadOutcome::Skipped {
                version,
                manifest_key,
            } => Self {
                status: SKIPPED,
                message: "Template version already exists".to_string(),
                template_name: template_name.to_string(),
                version,
                manifest_key,
                asset_count: None,
                total_size: None,
                removed_count: None,
                timestamp,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub status: &'static str,
    pub template_name: String,
    pub version_count: usize,
    pub versions: Vec<VersionSummary>,
}

#[derive(Debug, Serialize)]
pub struct VersionListResponse {
    pub status: &'static str,
    pub count: usize,
    pub versions: Vec<VersionSummary>,
}

#[derive(Debug, Serialize)]
pub struct LatestVersionResponse {
    pub status: &'static str,
    pub version: VersionSummary,
}

#[derive(Debug, Serialize)]
pub struct ManifestResponse {
    pub status: &'static str,
    pub manifest: Manifest,
}

/// Manifest plus asset keys; assets are fetched individually
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub status: &'static str,
    pub message: &'static str,
    #[serde(flatten)]
    pub download: DownloadInfo,
}

impl From<DownloadInfo> for DownloadResponse {
    fn from(download: DownloadInfo) -> Self {
        Self {
            status: SUCCESS,
            message: "Use individual asset URLs to download assets",
            download,
        }
    }
}

/// Body of `POST /update-data/{subdomain}`
#[derive(Debug, Default, Deserialize)]
pub struct DataUpdateRequest {
    #[serde(default)]
    pub shop_id: String,
    /// `shop`, `products` or `all`; empty means `all`
    #[serde(default)]
    pub data_type: String,
}

/// Body of `DELETE /cleanup/{subdomain}`
#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub shop_id: String,
}
