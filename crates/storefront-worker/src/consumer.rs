//! Build queue consumer
//!
//! Takes one job at a time: build the site, push the output to the site's
//! prefix, delete what the new build no longer contains and drop the local
//! output. A failing job is logged and skipped.

use bytes::Bytes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use storefront_registry::address::{self, SiteKeys};
use storefront_registry::storage::PutOptions;
use storefront_registry::sync::{SyncPlan, apply_removals, list_relative};
use storefront::content_type;
use storefront_registry::ObjectStore;
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

use crate::builder::SiteBuilder;
use crate::error::Result;
use crate::queue::{BuildJob, JobQueue};

/// Pause after a failed pop caused by the queue connection
pub const QUEUE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Outcome of publishing one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub site_name: String,
    pub uploaded: usize,
    pub removed: usize,
    pub total_bytes: u64,
}

pub struct Consumer<Q, B, S> {
    queue: Q,
    builder: B,
    store: Arc<S>,
    bucket: String,
    retry_delay: Duration,
}

impl<Q, B, S> Consumer<Q, B, S>
where
    Q: JobQueue,
    B: SiteBuilder,
    S: ObjectStore,
{
    pub fn new(queue: Q, builder: B, store: Arc<S>, bucket: impl Into<String>) -> Self {
        Self {
            queue,
            builder,
            store,
            bucket: bucket.into(),
            retry_delay: QUEUE_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Process jobs until `shutdown` resolves. A job in progress always runs
    /// to completion first.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(bucket = %self.bucket, "Waiting for build jobs");

        loop {
            let popped = tokio::select! {
                _ = &mut shutdown => {
                    // BLPOP has no timeout, so a pop is always pending here. A job
                    // the queue handed out in this instant is not processed.
                    warn!("Shutdown requested while waiting on the queue, abandoning pending pop");
                    break;
                }
                popped = self.queue.pop() => popped,
            };

            match popped {
                Ok(job) => {
                    if let Err(e) = self.process(&job).await {
                        error!(site = %job.site_name, template = %job.template_name, "Failed to process job: {}", e);
                    }
                }
                Err(e) if e.is_connection_error() => {
                    error!("Error fetching from queue: {}", e);
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => warn!("Dropping job: {}", e),
            }
        }
    }

    /// Build, publish and clean up one job
    #[instrument(skip(self), fields(site = %job.site_name, template = %job.template_name))]
    pub async fn process(&self, job: &BuildJob) -> Result<SyncReport> {
        info!("Processing build job");
        let output = self.builder.build(job).await?;
        let report = self.publish(&job.site_name, &output).await?;

        tokio::fs::remove_dir_all(&output).await?;
        info!(
            uploaded = report.uploaded,
            removed = report.removed,
            "Built, uploaded and cleaned up site"
        );
        Ok(report)
    }

    /// Make `{site}/` hold exactly the files of `directory`, leaving the
    /// site's data files alone
    pub async fn publish(&self, site_name: &str, directory: &Path) -> Result<SyncReport> {
        let prefix = SiteKeys::prefix(site_name);
        let files = collect_files(directory)?;

        let existing: Vec<String> =
            list_relative(self.store.as_ref(), &self.bucket, &prefix)
                .await?
                .into_iter()
                .filter(|path| !address::is_data_path(path))
                .collect();
        let plan = SyncPlan::new(files.iter().map(|(path, _)| path.clone()), existing);

        let mut total_bytes = 0;
        for (path, source) in &files {
            let data = Bytes::from(tokio::fs::read(source).await?);
            total_bytes += data.len() as u64;

            let content_type = content_type::for_asset(path);
            let key = SiteKeys::asset(site_name, path);
            self.store
                .put(
                    &self.bucket,
                    &key,
                    data,
                    PutOptions::new().content_type(content_type),
                )
                .await?;
            debug!(key = %key, content_type = %content_type, "Uploaded file");
        }

        let removed =
            apply_removals(self.store.as_ref(), &self.bucket, &prefix, &plan.removals).await?;

        Ok(SyncReport {
            site_name: site_name.to_string(),
            uploaded: files.len(),
            removed,
            total_bytes,
        })
    }
}

/// Regular files below `directory` as (slash separated relative path,
/// absolute path), sorted by path. Files under `data/` are skipped.
fn collect_files(directory: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(directory)
            .map_err(|e| std::io::Error::other(e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");
        if address::is_data_path(&relative) {
            warn!(path = %relative, "Skipping build file under the data directory");
            continue;
        }
        files.push((relative, entry.into_path()));
    }
    Ok(files)
}
