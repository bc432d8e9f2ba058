//! Build job queue
//!
//! Jobs are JSON documents pushed onto a redis list and taken with a
//! blocking pop, so each job reaches exactly one of the competing workers.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    pub site_name: String,
    pub template_name: String,
}

impl BuildJob {
    pub fn parse(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[async_trait]
pub trait JobQueue: Send {
    /// Wait for the next job. Malformed payloads are returned as errors.
    async fn pop(&mut self) -> Result<BuildJob>;
}

/// Blocking pops over a multiplexed connection. A connection that failed
/// a command is dropped and the next pop dials a fresh one.
pub struct RedisQueue {
    client: redis::Client,
    conn: Option<MultiplexedConnection>,
    queue: String,
}

impl RedisQueue {
    /// Open the client and establish the first connection
    pub async fn connect(redis_url: &str, queue: &str) -> Result<Self> {
        let mut this = Self::new(redis_url, queue)?;
        this.connection().await?;
        Ok(this)
    }

    /// Open the client without dialing; the first pop connects
    pub fn new(redis_url: &str, queue: &str) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            conn: None,
            queue: queue.to_string(),
        })
    }

    async fn connection(&mut self) -> Result<&mut MultiplexedConnection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let conn = self.client.get_multiplexed_async_connection().await?;
                info!(queue = %self.queue, "Connected to redis");
                conn
            }
        };
        Ok(self.conn.insert(conn))
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn pop(&mut self) -> Result<BuildJob> {
        let queue = self.queue.clone();
        let conn = self.connection().await?;

        // A zero timeout blocks until a job arrives
        let popped: redis::RedisResult<(String, String)> = redis::cmd("BLPOP")
            .arg(&queue)
            .arg(0)
            .query_async(conn)
            .await;
        let (_, payload) = popped.inspect_err(|e| {
            warn!(queue = %queue, error = %e, "Queue command failed, reconnecting on next pop");
            self.conn = None;
        })?;

        debug!(queue = %queue, "Popped build job");
        BuildJob::parse(&payload)
    }
}
