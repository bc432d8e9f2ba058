#![allow(dead_code)]

use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use serde_json::json;
use std::sync::Arc;
use storefront_registry::storage::MemoryStorage;
use storefront_registry::*;
use tar::{Builder, EntryType, Header};

pub const TEMPLATES: &str = "templates";
pub const STORES: &str = "stores";
pub const IMAGES: &str = "images";

/// Gzip tarball with every file placed below `build/`
pub fn build_archive(files: &[(&str, &[u8])]) -> Bytes {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    for (path, content) in files {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        builder
            .append_data(&mut header, format!("build/{}", path), *content)
            .unwrap();
    }
    Bytes::from(builder.into_inner().unwrap().finish().unwrap())
}

pub fn classic_v1() -> Bytes {
    build_archive(&[
        ("index.html", [b'h'; 120].as_slice()),
        ("style.css", [b'c'; 40].as_slice()),
        ("app.js", [b'j'; 200].as_slice()),
    ])
}

pub fn classic_v2() -> Bytes {
    build_archive(&[
        ("index.html", [b'H'; 130].as_slice()),
        ("theme.css", [b't'; 50].as_slice()),
        ("app.js", [b'J'; 210].as_slice()),
    ])
}

pub fn upload(template: &str, version: &str, archive: Bytes) -> UploadRequest {
    UploadRequest {
        template_name: template.to_string(),
        version: Some(version.to_string()),
        description: format!("{} {}", template, version),
        archive,
        ..Default::default()
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStorage>,
    pub registry: Arc<Registry<MemoryStorage>>,
    pub deployer: Deployer<MemoryStorage, StaticDataSource>,
}

pub fn fixture() -> Fixture {
    fixture_with(StaticDataSource::new(
        json!({"shop": {"title": "Acme"}}),
        json!({"products": {"totalCount": 2}}),
    ))
}

pub fn fixture_with(data: StaticDataSource) -> Fixture {
    let store = Arc::new(MemoryStorage::new());
    let registry = Arc::new(Registry::new(
        store.clone(),
        RegistryConfig {
            bucket: TEMPLATES.to_string(),
            public_url: "https://templates.example.com/".to_string(),
        },
    ));
    let deployer = Deployer::new(
        store.clone(),
        registry.clone(),
        Arc::new(data),
        DeployerConfig {
            templates_bucket: TEMPLATES.to_string(),
            stores_bucket: STORES.to_string(),
            platform_domain: "example.com".to_string(),
            images_bucket: Some(IMAGES.to_string()),
        },
    );
    Fixture {
        store,
        registry,
        deployer,
    }
}

pub fn deploy(subdomain: &str, template: &str, version: Option<&str>) -> DeployRequest {
    DeployRequest {
        shop_id: "shop-1".to_string(),
        subdomain: subdomain.to_string(),
        template_name: template.to_string(),
        version: version.map(str::to_string),
        ..Default::default()
    }
}
