//! Extension based content types for template assets and preview images

use std::path::Path;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn extension(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Content type of a built template asset
pub fn for_asset(path: &str) -> &'static str {
    match extension(path).as_deref() {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("woff") | Some("woff2") => "font/woff",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Content type of an uploaded preview image, JPEG when unknown
pub fn for_preview(file_name: &str) -> &'static str {
    match extension(file_name).as_deref() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}
