//! Storefront HTTP API
//!
//! Exposes the template registry (upload, listing, version queries) and the
//! site synchronizer (deploy, redeploy, data refresh, status, cleanup) over
//! JSON endpoints.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    response::Json,
    routing::get,
};
use serde_json::{Value, json};
use std::sync::Arc;
use storefront_registry::{Deployer, ObjectStore, Registry, StoreDataSource};
use time::format_description::well_known::Rfc3339;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod models;
pub mod routes;

use config::ServerConfig;
use error::Result;

/// Main application state
pub struct AppState<S: ObjectStore, D: StoreDataSource> {
    pub registry: Arc<Registry<S>>,
    pub deployer: Arc<Deployer<S, D>>,
    pub config: ServerConfig,
}

impl<S: ObjectStore, D: StoreDataSource> Clone for AppState<S, D> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            deployer: self.deployer.clone(),
            config: self.config.clone(),
        }
    }
}

/// Create the main application router
pub fn create_router<S, D>(state: AppState<S, D>) -> Router
where
    S: ObjectStore + 'static,
    D: StoreDataSource + 'static,
{
    let body_limit = state.config.max_upload_bytes;
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .nest("/templates", routes::templates::router())
        .merge(routes::deployments::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Health check endpoint
async fn health_check() -> Result<Json<Value>> {
    let timestamp = time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    Ok(Json(json!({
        "status": "healthy",
        "service": "storefront-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": timestamp
    })))
}
