//! # Storefront
//!
//! Build artifacts of storefront templates:
//! - Unpacking of uploaded `.tar.gz` builds into scratch workspaces
//! - Per-asset content types and `sha256:` checksums
//! - Manifests describing one immutable template version
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use storefront::{ManifestBuilder, ScratchWorkspace};
//!
//! # fn example(archive: &[u8]) -> storefront::Result<()> {
//! let workspace = ScratchWorkspace::unpack(archive)?;
//! let manifest = ManifestBuilder::new("storefront-classic", storefront::default_version())
//!     .description("Classic storefront layout")
//!     .build(&workspace.build_root()?)?;
//!
//! println!("{} assets, {} bytes", manifest.asset_count, manifest.total_size);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod checksum;
pub mod content_type;
pub mod error;
pub mod manifest;

pub use archive::{BUILD_ROOT, ScratchWorkspace};
pub use error::{ArchiveError, ManifestError, Result, StorefrontError};
pub use manifest::{AssetInfo, Manifest, ManifestBuilder};

use time::OffsetDateTime;
use time::macros::format_description;

/// Timestamp version label used when an upload names none, e.g. `v20240501-120000`
pub fn default_version() -> String {
    version_at(OffsetDateTime::now_utc())
}

pub fn version_at(at: OffsetDateTime) -> String {
    let format = format_description!("v[year][month][day]-[hour][minute][second]");
    at.to_offset(time::UtcOffset::UTC)
        .format(&format)
        .unwrap_or_else(|_| format!("v{}", at.unix_timestamp()))
}
