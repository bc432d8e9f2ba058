//! Integration tests for archive extraction feeding manifest construction

use flate2::{Compression, write::GzEncoder};
use storefront::*;
use tar::{Builder, EntryType, Header};

fn build_archive(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    for (path, content) in files {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        builder.append_data(&mut header, path, &content[..]).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[test]
fn test_archive_to_manifest() {
    let archive = build_archive(&[
        ("build/index.html", vec![b'h'; 120]),
        ("build/style.css", vec![b'c'; 40]),
        ("build/app.js", vec![b'j'; 200]),
        ("README.md", b"not part of the build".to_vec()),
    ]);

    let workspace = ScratchWorkspace::unpack(&archive[..]).unwrap();
    assert_eq!(workspace.file_count(), 4);

    let manifest = ManifestBuilder::new("storefront-classic", "v1")
        .build(&workspace.build_root().unwrap())
        .unwrap();

    assert_eq!(manifest.asset_count, 3);
    assert_eq!(manifest.total_size, 360);
    assert_eq!(
        manifest.asset_paths().collect::<Vec<_>>(),
        vec!["app.js", "index.html", "style.css"]
    );
    assert_eq!(manifest.asset("index.html").unwrap().content_type, "text/html");
    assert_eq!(manifest.asset("style.css").unwrap().content_type, "text/css");
    assert!(manifest.assets.iter().all(|asset| checksum::is_valid(&asset.checksum)));
    assert!(checksum::is_valid(&manifest.checksum));
}

#[test]
fn test_same_tree_same_checksum() {
    let archive = build_archive(&[("build/index.html", b"<h1>shop</h1>".to_vec())]);
    let workspace = ScratchWorkspace::unpack(&archive[..]).unwrap();
    let root = workspace.build_root().unwrap();

    let first = ManifestBuilder::new("a", "v1").build(&root).unwrap();
    let second = ManifestBuilder::new("a", "v2").build(&root).unwrap();
    assert_eq!(first.checksum, second.checksum);
}

#[test]
fn test_archive_without_build_directory() {
    let archive = build_archive(&[("dist/index.html", b"x".to_vec())]);
    let workspace = ScratchWorkspace::unpack(&archive[..]).unwrap();

    let err: StorefrontError = workspace.build_root().unwrap_err().into();
    assert!(err.to_string().contains("build"));
}

#[test]
fn test_default_version_shape() {
    let version = default_version();
    assert_eq!(version.len(), "v20240101-000000".len());
    assert!(version.starts_with('v'));
    assert_eq!(&version[9..10], "-");
}
