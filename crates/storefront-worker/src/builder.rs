//! External build toolchain invocation

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use storefront_registry::address;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::queue::BuildJob;

/// Directory the toolchain writes inside the template checkout
pub const TEMPLATE_BUILD_DIR: &str = "build";

#[async_trait]
pub trait SiteBuilder: Send + Sync {
    /// Build the job's template for its site and return the output directory
    async fn build(&self, job: &BuildJob) -> Result<PathBuf>;
}

/// Runs the configured command (by default `npm run build`) in the template
/// checkout and moves the result to `{output_dir}/{site}`
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    config: WorkerConfig,
}

impl CommandBuilder {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    async fn run_toolchain(&self, template_path: &Path, job: &BuildJob) -> Result<()> {
        let (program, args) = self
            .config
            .build_command
            .split_first()
            .ok_or_else(|| WorkerError::Config("BUILD_COMMAND is empty".to_string()))?;

        let output = Command::new(program)
            .args(args)
            .current_dir(template_path)
            .env("VITE_API_URL", self.config.api_url(&job.site_name))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            warn!(stdout = %stdout, stderr = %stderr, "Build command failed");
            return Err(WorkerError::Build {
                template: job.template_name.clone(),
                message: format!("{} exited with {}", program, output.status),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SiteBuilder for CommandBuilder {
    #[instrument(skip(self), fields(site = %job.site_name, template = %job.template_name))]
    async fn build(&self, job: &BuildJob) -> Result<PathBuf> {
        address::validate_template_name(&job.template_name)?;
        address::validate_subdomain(&job.site_name)?;

        let template_path = self.config.templates_dir.join(&job.template_name);
        if !template_path.is_dir() {
            return Err(WorkerError::TemplateMissing(template_path));
        }

        info!("Building site");
        self.run_toolchain(&template_path, job).await?;

        let output_path = self.config.build_output_dir.join(&job.site_name);
        if tokio::fs::try_exists(&output_path).await? {
            debug!(path = %output_path.display(), "Removing previous build output");
            tokio::fs::remove_dir_all(&output_path).await?;
        }
        tokio::fs::create_dir_all(&self.config.build_output_dir).await?;
        tokio::fs::rename(template_path.join(TEMPLATE_BUILD_DIR), &output_path).await?;

        info!(path = %output_path.display(), "Site built");
        Ok(output_path)
    }
}
