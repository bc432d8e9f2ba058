//! Build queue consumer
//!
//! Pops `{site_name, template_name}` jobs from a redis list, builds the
//! template with the site's backend endpoint injected and reconciles the
//! output into the site's prefix of the sites bucket.

pub mod builder;
pub mod config;
pub mod consumer;
pub mod error;
pub mod queue;

pub use builder::{CommandBuilder, SiteBuilder};
pub use config::WorkerConfig;
pub use consumer::{Consumer, SyncReport};
pub use error::{Result, WorkerError};
pub use queue::{BuildJob, JobQueue, RedisQueue};
