//! Object key layout of the templates and stores buckets

use crate::error::{RegistryError, Result};

/// Top-level prefix holding preview images, never a template name
pub const PREVIEWS_PREFIX: &str = "template-previews";

/// Sub-prefix of a tenant holding generated data files
pub const DATA_DIR: &str = "data";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const LATEST_FILE: &str = "latest";
pub const ROOT_DOCUMENT: &str = "index.html";

/// Key generation for the templates bucket
pub struct TemplateKeys;

impl TemplateKeys {
    /// Prefix of every object of one template
    /// Example: "storefront-classic/"
    pub fn template_prefix(template: &str) -> String {
        format!("{}/", template)
    }

    /// Prefix of one version
    /// Example: "storefront-classic/v1/"
    pub fn version_prefix(template: &str, version: &str) -> String {
        format!("{}/{}/", template, version)
    }

    /// Example: "storefront-classic/v1/_app/start.js"
    pub fn asset(template: &str, version: &str, path: &str) -> String {
        format!("{}/{}/{}", template, version, path)
    }

    /// Example: "storefront-classic/v1/manifest.json"
    pub fn manifest(template: &str, version: &str) -> String {
        format!("{}/{}/{}", template, version, MANIFEST_FILE)
    }

    /// Plain-text pointer to the most recent version
    /// Example: "storefront-classic/latest"
    pub fn latest(template: &str) -> String {
        format!("{}/{}", template, LATEST_FILE)
    }

    /// Example: "template-previews/storefront-classic/v1/preview_1714564800.png"
    pub fn preview(template: &str, version: &str, epoch: i64, file_name: &str) -> String {
        format!(
            "{}/{}/{}/preview_{}{}",
            PREVIEWS_PREFIX,
            template,
            version,
            epoch,
            preview_extension(file_name)
        )
    }

    /// Version component of a version prefix returned by a delimited listing
    /// Example: "storefront-classic/v1/" -> "v1"
    pub fn version_from_prefix<'a>(template: &str, prefix: &'a str) -> Option<&'a str> {
        prefix
            .strip_prefix(template)?
            .strip_prefix('/')?
            .strip_suffix('/')
            .filter(|version| !version.is_empty())
    }
}

/// Key generation for the stores bucket
pub struct SiteKeys;

impl SiteKeys {
    /// Example: "acme/"
    pub fn prefix(subdomain: &str) -> String {
        format!("{}/", subdomain)
    }

    /// Example: "acme/_app/start.js"
    pub fn asset(subdomain: &str, path: &str) -> String {
        format!("{}/{}", subdomain, path)
    }

    /// Example: "acme/data/"
    pub fn data_prefix(subdomain: &str) -> String {
        format!("{}/{}/", subdomain, DATA_DIR)
    }

    /// Example: "acme/data/shop.json"
    pub fn data_file(subdomain: &str, file: &str) -> String {
        format!("{}/{}/{}", subdomain, DATA_DIR, file)
    }

    /// Example: "acme/index.html"
    pub fn root_document(subdomain: &str) -> String {
        format!("{}/{}", subdomain, ROOT_DOCUMENT)
    }
}

/// Key generation for the images bucket
pub struct ImageKeys;

impl ImageKeys {
    /// Example: "shops/shop-1/images/"
    pub fn shop_prefix(shop_id: &str) -> String {
        format!("shops/{}/images/", shop_id)
    }

    /// Example: "products/shop_shop-1/"
    pub fn products_prefix(shop_id: &str) -> String {
        format!("products/shop_{}/", shop_id)
    }
}

/// Whether a manifest-relative path lands in the tenant data directory
pub fn is_data_path(path: &str) -> bool {
    path == DATA_DIR || path.starts_with(&format!("{}/", DATA_DIR))
}

/// Reject asset paths that would overwrite the manifest key of their
/// version directory
pub fn check_version_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Result<()> {
    match paths.into_iter().find(|path| *path == MANIFEST_FILE) {
        Some(path) => Err(RegistryError::Validation(format!(
            "asset '{}' collides with the version manifest",
            path
        ))),
        None => Ok(()),
    }
}

/// Like [`check_version_paths`], also rejecting paths that would land in
/// the tenant data directory once deployed
pub fn check_site_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Result<()> {
    for path in paths {
        check_version_paths([path])?;
        if is_data_path(path) {
            return Err(RegistryError::Validation(format!(
                "asset '{}' collides with the tenant data directory",
                path
            )));
        }
    }
    Ok(())
}

/// Extension of a preview upload including the dot, `.jpg` if none
fn preview_extension(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_else(|| ".jpg".to_string())
}

fn validate_segment(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RegistryError::Validation(format!("{} is required", kind)));
    }
    if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        return Err(RegistryError::Validation(format!(
            "{} '{}' must be a single path segment",
            kind, value
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(RegistryError::Validation(format!(
            "{} contains control characters",
            kind
        )));
    }
    Ok(())
}

/// Template names become the first key segment of the templates bucket
pub fn validate_template_name(name: &str) -> Result<()> {
    validate_segment("template_name", name)?;
    if name == PREVIEWS_PREFIX {
        return Err(RegistryError::Validation(format!(
            "template_name '{}' is reserved",
            name
        )));
    }
    Ok(())
}

pub fn validate_version(version: &str) -> Result<()> {
    validate_segment("version", version)?;
    if version == LATEST_FILE || version == MANIFEST_FILE {
        return Err(RegistryError::Validation(format!(
            "version '{}' is reserved",
            version
        )));
    }
    Ok(())
}

pub fn validate_subdomain(subdomain: &str) -> Result<()> {
    validate_segment("subdomain", subdomain)
}

/// Shop ids name image prefixes swept by cleanup
pub fn validate_shop_segment(shop_id: &str) -> Result<()> {
    validate_segment("shop_id", shop_id)
}
