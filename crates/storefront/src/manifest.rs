use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::{Component, Path};
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::{checksum, content_type, error::ManifestError};

pub const META_TITLE: &str = "title";
pub const META_CATEGORY: &str = "category";
pub const META_FEATURES: &str = "features";

/// A single file of a template build
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetInfo {
    /// POSIX-style path relative to the build root
    pub path: String,
    pub size: u64,
    pub content_type: String,
    /// `sha256:<hex>` of the file content
    pub checksum: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
}

/// Immutable description of one template build
///
/// A manifest is written once, after every asset it lists, so its presence
/// in the store marks the version as complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub template_name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub upload_time: OffsetDateTime,
    /// Traceability only, derived from template, version and upload epoch
    pub build_id: String,
    pub assets: Vec<AssetInfo>,
    pub total_size: u64,
    pub asset_count: usize,
    /// Digest over the serialized asset list
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Manifest {
    /// Digest of the asset list, the integrity stamp stored in `checksum`
    pub fn assets_checksum(assets: &[AssetInfo]) -> Result<String, ManifestError> {
        let bytes = serde_json::to_vec(assets)?;
        Ok(checksum::hash(&bytes))
    }

    pub fn asset(&self, path: &str) -> Option<&AssetInfo> {
        self.assets.iter().find(|asset| asset.path == path)
    }

    pub fn asset_paths(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(|asset| asset.path.as_str())
    }

    /// Human readable title, falling back to one derived from the name
    pub fn title(&self) -> String {
        self.metadata
            .get(META_TITLE)
            .filter(|title| !title.is_empty())
            .cloned()
            .unwrap_or_else(|| format_title(&self.template_name))
    }

    pub fn category(&self) -> Option<&str> {
        self.metadata
            .get(META_CATEGORY)
            .map(String::as_str)
            .filter(|category| !category.is_empty())
    }

    pub fn features(&self) -> Vec<String> {
        self.metadata
            .get(META_FEATURES)
            .map(|features| parse_features(features))
            .unwrap_or_default()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ManifestError> {
        serde_json::to_vec_pretty(self).map_err(ManifestError::Serialization)
    }

    /// Deserialize and re-validate a stored manifest
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the derived fields against the asset list
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.template_name.trim().is_empty() {
            return Err(ManifestError::MissingField("template_name"));
        }
        if self.version.trim().is_empty() {
            return Err(ManifestError::MissingField("version"));
        }

        let mut seen = HashSet::with_capacity(self.assets.len());
        for asset in &self.assets {
            validate_asset_path(&asset.path)?;
            if !seen.insert(asset.path.as_str()) {
                return Err(ManifestError::DuplicateAsset(asset.path.clone()));
            }
        }

        if self.asset_count != self.assets.len() {
            return Err(ManifestError::AssetCountMismatch {
                declared: self.asset_count,
                actual: self.assets.len(),
            });
        }

        let actual_size: u64 = self.assets.iter().map(|asset| asset.size).sum();
        if self.total_size != actual_size {
            return Err(ManifestError::TotalSizeMismatch {
                declared: self.total_size,
                actual: actual_size,
            });
        }

        if Self::assets_checksum(&self.assets)? != self.checksum {
            return Err(ManifestError::ChecksumMismatch);
        }

        Ok(())
    }
}

/// Walks an extracted build directory and produces its [`Manifest`]
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    template_name: String,
    version: String,
    description: String,
    git_commit: Option<String>,
    metadata: BTreeMap<String, String>,
    upload_time: Option<OffsetDateTime>,
}

impl ManifestBuilder {
    pub fn new(template_name: impl Into<String>, version: impl Into<String>) -> Self {
        let template_name = template_name.into();
        let mut metadata = BTreeMap::new();
        metadata.insert(META_TITLE.to_string(), format_title(&template_name));

        Self {
            template_name,
            version: version.into(),
            description: String::new(),
            git_commit: None,
            metadata,
            upload_time: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        if !category.trim().is_empty() {
            self.metadata
                .insert(META_CATEGORY.to_string(), category.trim().to_string());
        }
        self
    }

    pub fn features<I, F>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: AsRef<str>,
    {
        let joined = features
            .into_iter()
            .map(|feature| feature.as_ref().trim().to_string())
            .filter(|feature| !feature.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        if !joined.is_empty() {
            self.metadata.insert(META_FEATURES.to_string(), joined);
        }
        self
    }

    pub fn git_commit(mut self, commit: impl Into<String>) -> Self {
        self.git_commit = Some(commit.into());
        self
    }

    /// Override the upload timestamp (defaults to now)
    pub fn upload_time(mut self, upload_time: OffsetDateTime) -> Self {
        self.upload_time = Some(upload_time);
        self
    }

    /// Walk `root` once, hashing and typing every regular file below it
    pub fn build(self, root: &Path) -> Result<Manifest, ManifestError> {
        if self.template_name.trim().is_empty() {
            return Err(ManifestError::MissingField("template_name"));
        }
        if self.version.trim().is_empty() {
            return Err(ManifestError::MissingField("version"));
        }

        let upload_time = self.upload_time.unwrap_or_else(OffsetDateTime::now_utc);
        let mut assets = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = relative_posix_path(root, entry.path())?;
            let metadata = entry.metadata()?;
            // RFC 3339 round trips must be exact for the manifest checksum
            let last_modified = metadata
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or(upload_time);
            let last_modified = last_modified
                .replace_nanosecond(0)
                .unwrap_or(last_modified);

            assets.push(AssetInfo {
                content_type: content_type::for_asset(&path).to_string(),
                checksum: checksum::hash_reader(File::open(entry.path())?)?,
                size: metadata.len(),
                last_modified,
                path,
            });
        }

        let checksum = Manifest::assets_checksum(&assets)?;
        let build_id = format!(
            "build_{}_{}_{}",
            self.template_name,
            self.version,
            upload_time.unix_timestamp()
        );

        Ok(Manifest {
            total_size: assets.iter().map(|asset| asset.size).sum(),
            asset_count: assets.len(),
            template_name: self.template_name,
            version: self.version,
            description: self.description,
            upload_time,
            build_id,
            assets,
            checksum,
            git_commit: self.git_commit,
            metadata: self.metadata,
            thumbnail_url: None,
        })
    }
}

fn relative_posix_path(root: &Path, path: &Path) -> Result<String, ManifestError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| ManifestError::InvalidAssetPath(path.display().to_string()))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| ManifestError::InvalidAssetPath(path.display().to_string()))?,
            ),
            _ => return Err(ManifestError::InvalidAssetPath(path.display().to_string())),
        }
    }
    Ok(parts.join("/"))
}

/// Asset paths must be relative, slash separated and free of `..`
pub fn validate_asset_path(path: &str) -> Result<(), ManifestError> {
    if path.trim().is_empty() {
        return Err(ManifestError::InvalidAssetPath("path cannot be empty".into()));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(ManifestError::InvalidAssetPath(path.to_string()));
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(ManifestError::InvalidAssetPath(path.to_string()));
    }
    Ok(())
}

/// `storefront-classic` -> `Storefront Classic`
pub fn format_title(template_name: &str) -> String {
    template_name
        .replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a comma separated feature list, dropping blanks
pub fn parse_features(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|feature| !feature.is_empty())
        .map(str::to_string)
        .collect()
}
