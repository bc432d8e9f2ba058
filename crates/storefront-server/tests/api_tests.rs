use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use flate2::{Compression, write::GzEncoder};
use serde_json::{Value, json};
use std::sync::Arc;
use storefront_registry::storage::MemoryStorage;
use storefront_registry::{
    Deployer, DeployerConfig, Registry, RegistryConfig, StaticDataSource,
};
use storefront_server::{AppState, config::ServerConfig, create_router};
use tar::{Builder, EntryType, Header};
use tower::ServiceExt;

const BOUNDARY: &str = "storefront-test-boundary";

fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
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
    builder.into_inner().unwrap().finish().unwrap()
}

fn classic_archive() -> Vec<u8> {
    build_archive(&[
        ("index.html", [b'h'; 120].as_slice()),
        ("style.css", [b'c'; 40].as_slice()),
        ("app.js", [b'j'; 200].as_slice()),
    ])
}

fn multipart_body(fields: &[(&str, &str)], archive: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(archive) = archive {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"assets\"; filename=\"build.tar.gz\"\r\nContent-Type: application/gzip\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(archive);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn app() -> (Router, Arc<MemoryStorage>) {
    let store = Arc::new(MemoryStorage::new());
    let registry = Arc::new(Registry::new(
        store.clone(),
        RegistryConfig {
            bucket: "templates".to_string(),
            public_url: "https://templates.example.com".to_string(),
        },
    ));
    let deployer = Arc::new(Deployer::new(
        store.clone(),
        registry.clone(),
        Arc::new(StaticDataSource::new(
            json!({"shop": {"title": "Acme"}}),
            json!({"products": {"totalCount": 0}}),
        )),
        DeployerConfig {
            templates_bucket: "templates".to_string(),
            stores_bucket: "stores".to_string(),
            platform_domain: "example.com".to_string(),
            images_bucket: None,
        },
    ));

    let state = AppState {
        registry,
        deployer,
        config: ServerConfig::default(),
    };
    (create_router(state), store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn upload_request(fields: &[(&str, &str)], archive: Option<&[u8]>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/templates/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields, archive)))
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "storefront-server");
}

#[tokio::test]
async fn test_upload_then_skip() {
    let (app, store) = app();
    let archive = classic_archive();
    let fields = [
        ("template_name", "storefront-classic"),
        ("version", "v1"),
        ("features", "cart, search"),
    ];

    let (status, body) = send(&app, upload_request(&fields, Some(archive.as_slice()))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["version"], "v1");
    assert_eq!(body["asset_count"], 3);
    assert_eq!(body["total_size"], 360);
    assert!(
        store
            .keys("templates")
            .contains(&"storefront-classic/v1/manifest.json".to_string())
    );

    let (status, body) = send(&app, upload_request(&fields, Some(archive.as_slice()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["message"], "Template version already exists");
}

#[tokio::test]
async fn test_upload_requires_name_and_assets() {
    let (app, _) = app();
    let archive = classic_archive();

    let (status, body) = send(&app, upload_request(&[("version", "v1")], Some(archive.as_slice()))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], 400);

    let (status, _) = send(
        &app,
        upload_request(&[("template_name", "storefront-classic")], None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_without_build_dir_is_client_error() {
    let (app, _) = app();
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    let mut header = Header::new_gnu();
    header.set_size(1);
    header.set_mode(0o644);
    header.set_entry_type(EntryType::Regular);
    builder
        .append_data(&mut header, "dist/index.html", b"x".as_slice())
        .unwrap();
    let archive = builder.into_inner().unwrap().finish().unwrap();

    let (status, body) = send(
        &app,
        upload_request(&[("template_name", "storefront-classic")], Some(archive.as_slice())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
}

#[tokio::test]
async fn test_template_queries() {
    let (app, _) = app();
    let archive = classic_archive();
    let fields = [("template_name", "storefront-classic"), ("version", "v1")];
    send(&app, upload_request(&fields, Some(archive.as_slice()))).await;

    let (status, body) = send(&app, get("/templates")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["name"], "storefront-classic");
    assert_eq!(body[0]["version"], "v1");

    let (status, body) = send(&app, get("/templates/storefront-classic")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version_count"], 1);

    let (status, body) = send(&app, get("/templates/storefront-classic/versions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body) = send(&app, get("/templates/storefront-classic/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"]["version"], "v1");

    let (status, body) = send(&app, get("/templates/storefront-classic/versions/v1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["manifest"]["asset_count"], 3);

    let (status, body) = send(
        &app,
        get("/templates/storefront-classic/versions/v1/download"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["asset_keys"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_unknown_template_is_not_found() {
    let (app, _) = app();

    let (status, _) = send(&app, get("/templates/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/templates/missing/latest")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get("/templates/missing/versions/v1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_deploy_status_and_cleanup() {
    let (app, store) = app();
    let archive = classic_archive();
    let fields = [("template_name", "storefront-classic"), ("version", "v1")];
    send(&app, upload_request(&fields, Some(archive.as_slice()))).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/deploy",
            json!({
                "shop_id": "shop-1",
                "subdomain": "acme",
                "template_name": "storefront-classic"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["version"], "v1");
    assert_eq!(body["asset_count"], 3);
    assert_eq!(body["url"], "https://acme.example.com");
    assert!(store.keys("stores").contains(&"acme/index.html".to_string()));

    let (status, body) = send(&app, get("/status/acme")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["template_version"], "v1");
    assert_eq!(body["accessible"], true);

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/update-data/acme",
            json!({"shop_id": "shop-1", "data_type": "products"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data_type"], "products");

    let (status, body) = send(
        &app,
        json_request(Method::DELETE, "/cleanup/acme", json!({"shop_id": "shop-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert!(store.keys("stores").is_empty());

    let (status, _) = send(&app, get("/status/acme")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deploy_rejects_incomplete_body() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/deploy", json!({"subdomain": "acme"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/deploy",
            json!({"shop_id": "", "subdomain": "acme", "template_name": "storefront-classic"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_data_rejects_unknown_scope() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/update-data/acme",
            json!({"shop_id": "shop-1", "data_type": "orders"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("Invalid data_type"));
}

#[tokio::test]
async fn test_redeploy_unknown_site_is_not_found() {
    let (app, _) = app();
    let (status, _) = send(
        &app,
        json_request(Method::POST, "/redeploy/acme", json!({"shop_id": "shop-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_with_root_manifest_file_is_rejected() {
    let (app, store) = app();
    let archive = build_archive(&[
        ("index.html", b"<html></html>".as_slice()),
        ("manifest.json", br#"{"name":"Acme"}"#.as_slice()),
    ]);

    let (status, body) = send(
        &app,
        upload_request(
            &[("template_name", "storefront-classic"), ("version", "v1")],
            Some(archive.as_slice()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["status"], "error");
    assert!(store.keys("templates").is_empty());
}
