//! Template registry routes

use crate::{
    AppState,
    error::{ApiError, Result},
    models::{
        DownloadResponse, LatestVersionResponse, ManifestResponse, SUCCESS, TemplateResponse,
        UploadResponse, VersionListResponse,
    },
    routes::with_timeout,
};
use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    routing::{get, post},
};
use storefront_registry::{
    ObjectStore, PreviewImage, RegistryError, StoreDataSource, TemplateSummary, UploadRequest,
};
use tracing::{debug, error, info};

/// Create template routes
pub fn router<S, D>() -> Router<AppState<S, D>>
where
    S: ObjectStore + 'static,
    D: StoreDataSource + 'static,
{
    Router::new()
        .route("/", get(list_templates::<S, D>))
        .route("/upload", post(upload_template::<S, D>))
        .route("/{template_name}", get(get_template::<S, D>))
        .route("/{template_name}/versions", get(list_versions::<S, D>))
        .route("/{template_name}/latest", get(latest_version::<S, D>))
        .route("/{template_name}/versions/{version}", get(get_version::<S, D>))
        .route(
            "/{template_name}/versions/{version}/download",
            get(download_version::<S, D>),
        )
}

/// List every template with metadata from its latest manifest
async fn list_templates<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
) -> Result<Json<Vec<TemplateSummary>>> {
    let templates = state.registry.list_templates().await.map_err(|e| {
        error!("Failed to list templates: {}", e);
        e
    })?;
    Ok(Json(templates))
}

fn split_features(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|feature| !feature.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Upload a built template from a multipart form
async fn upload_template<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut request = UploadRequest::default();
    let mut has_assets = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "template_name" => request.template_name = field.text().await?.trim().to_string(),
            "version" => request.version = non_empty(field.text().await?),
            "description" => request.description = field.text().await?,
            "category" => request.category = non_empty(field.text().await?),
            "features" => request.features = split_features(&field.text().await?),
            "force" => request.force = field.text().await?.trim().eq_ignore_ascii_case("true"),
            "assets" => {
                request.archive = field.bytes().await?;
                has_assets = true;
            }
            "preview_image" => {
                let file_name = field.file_name().unwrap_or("preview.jpg").to_string();
                let data = field.bytes().await?;
                if !data.is_empty() {
                    request.preview_image = Some(PreviewImage { file_name, data });
                }
            }
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    if request.template_name.is_empty() {
        return Err(ApiError::validation("Template name is required"));
    }
    if !has_assets {
        return Err(ApiError::bad_request("Missing assets archive"));
    }

    info!(
        template = %request.template_name,
        archive_size = request.archive_size(),
        force = request.force,
        "Template upload received"
    );

    let template_name = request.template_name.clone();
    let outcome = with_timeout(
        state.config.request_timeout(),
        state.registry.upload(request),
    )
    .await
    .map_err(|e| {
        error!(template = %template_name, "Template upload failed: {}", e);
        e
    })?;

    Ok(Json(UploadResponse::new(&template_name, outcome)))
}

/// Versions of one template, 404 when it has none
async fn get_template<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    Path(template_name): Path<String>,
) -> Result<Json<TemplateResponse>> {
    let versions = state.registry.list_versions(&template_name).await?;
    if versions.is_empty() {
        return Err(RegistryError::TemplateNotFound(template_name).into());
    }

    Ok(Json(TemplateResponse {
        status: SUCCESS,
        template_name,
        version_count: versions.len(),
        versions,
    }))
}

async fn list_versions<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    Path(template_name): Path<String>,
) -> Result<Json<VersionListResponse>> {
    let versions = state.registry.list_versions(&template_name).await?;
    Ok(Json(VersionListResponse {
        status: SUCCESS,
        count: versions.len(),
        versions,
    }))
}

async fn latest_version<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    Path(template_name): Path<String>,
) -> Result<Json<LatestVersionResponse>> {
    let version = state.registry.latest_version(&template_name).await?;
    Ok(Json(LatestVersionResponse {
        status: SUCCESS,
        version,
    }))
}

async fn get_version<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    Path((template_name, version)): Path<(String, String)>,
) -> Result<Json<ManifestResponse>> {
    let manifest = state.registry.get_manifest(&template_name, &version).await?;
    Ok(Json(ManifestResponse {
        status: SUCCESS,
        manifest,
    }))
}

async fn download_version<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    Path((template_name, version)): Path<(String, String)>,
) -> Result<Json<DownloadResponse>> {
    let download = state.registry.download(&template_name, &version).await?;
    Ok(Json(download.into()))
}
