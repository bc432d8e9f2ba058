//! Storefront HTTP API Server
//!
//! Serves template uploads and queries from the templates bucket and deploys
//! template versions into tenant prefixes of the stores bucket.

use std::{net::SocketAddr, sync::Arc};
use storefront_registry::{
    Deployer, DeployerConfig, GraphQlDataSource, Registry, RegistryConfig, S3Storage,
};
use storefront_server::{
    AppState,
    config::ServerConfig,
    create_router,
    error::{ApiError, Result},
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "storefront_server=debug,storefront_registry=debug,tower_http=debug".to_string()
        }))
        .init();

    let config = ServerConfig::from_env()?;
    info!(
        "Starting Storefront Server on {}:{}",
        config.host, config.port
    );

    let storage =
        Arc::new(S3Storage::from_env().map_err(|e| ApiError::Config(e.to_string()))?);

    for bucket in [&config.templates_bucket, &config.stores_bucket] {
        if let Err(e) = storage.ensure_bucket(bucket).await {
            error!("Failed to ensure bucket {} exists: {}", bucket, e);
        }
    }

    let registry = Arc::new(Registry::new(
        storage.clone(),
        RegistryConfig {
            bucket: config.templates_bucket.clone(),
            public_url: config.public_url.clone(),
        },
    ));

    let data_source = Arc::new(GraphQlDataSource::new(
        reqwest::Client::new(),
        &config.backend_url,
    ));
    info!("Tenant data source: {}", data_source.endpoint());

    let deployer = Arc::new(Deployer::new(
        storage,
        registry.clone(),
        data_source,
        DeployerConfig {
            templates_bucket: config.templates_bucket.clone(),
            stores_bucket: config.stores_bucket.clone(),
            platform_domain: config.platform_domain.clone(),
            images_bucket: config.images_bucket.clone(),
        },
    ));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ApiError::Config("Invalid HOST value".to_string()))?;

    let state = AppState {
        registry,
        deployer,
        config,
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
