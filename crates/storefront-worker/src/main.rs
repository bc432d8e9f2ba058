use std::sync::Arc;
use storefront_registry::S3Storage;
use storefront_worker::{CommandBuilder, Consumer, RedisQueue, Result, WorkerConfig, WorkerError};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| {
            "storefront_worker=info,storefront_registry=info".to_string()
        }))
        .init();

    let config = WorkerConfig::from_env()?;
    info!(queue = %config.build_queue, "storefront-worker starting up");

    let storage =
        Arc::new(S3Storage::from_env().map_err(|e| WorkerError::Config(e.to_string()))?);
    if let Err(e) = storage.ensure_bucket(&config.sites_bucket).await {
        error!("Failed to ensure bucket {} exists: {}", config.sites_bucket, e);
    }

    let queue = RedisQueue::connect(&config.redis_url, &config.build_queue).await?;
    let builder = CommandBuilder::new(&config);

    let mut consumer = Consumer::new(queue, builder, storage, config.sites_bucket.clone());
    consumer
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("storefront-worker stopped");
    Ok(())
}
