//! Tenant site deployment routes

use crate::{
    AppState,
    error::{ApiError, Result},
    models::{CleanupRequest, DataUpdateRequest},
    routes::with_timeout,
};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{delete, get, post},
};
use storefront_registry::{
    CleanupResult, DataScope, DataUpdateResult, DeployRequest, DeploymentResult,
    DeploymentStatus, ObjectStore, RedeployRequest, StoreDataSource,
};
use tracing::{error, info};

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

/// Create deployment routes
pub fn router<S, D>() -> Router<AppState<S, D>>
where
    S: ObjectStore + 'static,
    D: StoreDataSource + 'static,
{
    Router::new()
        .route("/deploy", post(deploy::<S, D>))
        .route("/redeploy/{subdomain}", post(redeploy::<S, D>))
        .route("/update-data/{subdomain}", post(update_data::<S, D>))
        .route("/status/{subdomain}", get(status::<S, D>))
        .route("/cleanup/{subdomain}", delete(cleanup::<S, D>))
}

async fn deploy<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    body: JsonBody<DeployRequest>,
) -> Result<Json<DeploymentResult>> {
    let Json(request) = body?;
    if request.shop_id.is_empty() || request.subdomain.is_empty() || request.template_name.is_empty()
    {
        return Err(ApiError::validation(
            "Missing required fields: shop_id, subdomain, template_name",
        ));
    }

    info!(
        shop_id = %request.shop_id,
        subdomain = %request.subdomain,
        template = %request.template_name,
        "Deploy requested"
    );
    let subdomain = request.subdomain.clone();
    let result = with_timeout(state.config.request_timeout(), state.deployer.deploy(request))
        .await
        .map_err(|e| {
            error!(subdomain = %subdomain, "Deployment failed: {}", e);
            e
        })?;

    Ok(Json(result))
}

async fn redeploy<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    Path(subdomain): Path<String>,
    body: JsonBody<RedeployRequest>,
) -> Result<Json<DeploymentResult>> {
    let Json(mut request) = body?;
    request.subdomain = subdomain;

    let result = with_timeout(
        state.config.request_timeout(),
        state.deployer.redeploy(request),
    )
    .await?;
    Ok(Json(result))
}

async fn update_data<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    Path(subdomain): Path<String>,
    body: JsonBody<DataUpdateRequest>,
) -> Result<Json<DataUpdateResult>> {
    let Json(request) = body?;
    let scope: DataScope = request.data_type.parse()?;

    let result = with_timeout(
        state.config.request_timeout(),
        state.deployer.update_data(&request.shop_id, &subdomain, scope),
    )
    .await?;
    Ok(Json(result))
}

async fn status<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    Path(subdomain): Path<String>,
) -> Result<Json<DeploymentStatus>> {
    Ok(Json(state.deployer.status(&subdomain).await?))
}

async fn cleanup<S: ObjectStore, D: StoreDataSource>(
    State(state): State<AppState<S, D>>,
    Path(subdomain): Path<String>,
    body: JsonBody<CleanupRequest>,
) -> Result<Json<CleanupResult>> {
    let Json(request) = body?;
    let result = with_timeout(
        state.config.request_timeout(),
        state.deployer.cleanup(&request.shop_id, &subdomain),
    )
    .await?;
    Ok(Json(result))
}
