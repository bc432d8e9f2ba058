//! Worker configuration management

use std::path::PathBuf;

use crate::error::{Result, WorkerError};

/// Placeholder replaced by the site name in `api_url_template`
pub const SITE_PLACEHOLDER: &str = "{site}";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,

    /// Redis list jobs are popped from
    pub build_queue: String,

    /// Bucket receiving built sites under `{site}/`
    pub sites_bucket: String,

    /// Checked out templates, one directory per template name
    pub templates_dir: PathBuf,

    /// Local build output, one directory per site
    pub build_output_dir: PathBuf,

    /// Program and arguments run inside the template directory
    pub build_command: Vec<String>,

    /// Backend endpoint injected into the build as `VITE_API_URL`
    pub api_url_template: String,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl WorkerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let build_command = parse_command(&var_or("BUILD_COMMAND", "npm run build"))?;

        Ok(Self {
            redis_url: var_or("REDIS_URL", &defaults.redis_url),
            build_queue: var_or("BUILD_QUEUE", &defaults.build_queue),
            sites_bucket: var_or("SITES_BUCKET", &defaults.sites_bucket),
            templates_dir: std::env::var("TEMPLATES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.templates_dir),
            build_output_dir: std::env::var("BUILD_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.build_output_dir),
            build_command,
            api_url_template: var_or("API_URL_TEMPLATE", &defaults.api_url_template),
        })
    }

    /// Backend endpoint for one site
    pub fn api_url(&self, site_name: &str) -> String {
        self.api_url_template.replace(SITE_PLACEHOLDER, site_name)
    }
}

fn parse_command(raw: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(WorkerError::Config("BUILD_COMMAND is empty".to_string()));
    }
    Ok(parts)
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            build_queue: "build-queue".to_string(),
            sites_bucket: "stores".to_string(),
            templates_dir: PathBuf::from("./templates"),
            build_output_dir: PathBuf::from("./built_sites"),
            build_command: vec!["npm".to_string(), "run".to_string(), "build".to_string()],
            api_url_template: "http://{site}.localhost:8080/api/query".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_substitutes_site() {
        let config = WorkerConfig::default();
        assert_eq!(config.api_url("acme"), "http://acme.localhost:8080/api/query");
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(" npm  run build ").unwrap(), vec!["npm", "run", "build"]);
        assert!(matches!(parse_command("   "), Err(WorkerError::Config(_))));
    }
}
