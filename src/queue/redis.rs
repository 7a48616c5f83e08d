//! Redis-backed queue store.
//!
//! Uses plain Redis lists: LPUSH to enqueue, BRPOP to dequeue. Redis
//! guarantees that a BRPOP hands any given element to exactly one client.

use super::{Popped, QueueStore};
use crate::config::secrets::{ExposeSecret, SecretString, redact_url};
use crate::error::{Error, Result};
use crate::telemetry::metrics;
use async_trait::async_trait;
use deadpool_redis::{Pool, Runtime};
use opentelemetry::KeyValue;
use std::time::Duration;
use tracing::{debug, info};

/// Smallest BRPOP timeout we send; a zero timeout would block forever.
const MIN_POP_TIMEOUT_SECS: f64 = 0.01;

/// Redis queue store over a small connection pool.
#[derive(Clone)]
pub struct RedisQueue {
    pool: Pool,
    display_url: String,
}

impl RedisQueue {
    /// Build the pool and verify the server answers PING.
    ///
    /// Any failure here is an [`Error::Connection`], which callers treat
    /// as fatal.
    pub async fn connect(url: &SecretString) -> Result<Self> {
        let display_url = redact_url(url.expose_secret());
        let pool = deadpool_redis::Config::from_url(url.expose_secret())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Connection(format!("{display_url}: {e}")))?;

        let queue = Self { pool, display_url };
        queue
            .ping()
            .await
            .map_err(|e| Error::Connection(format!("{}: {e}", queue.display_url)))?;

        info!(url = %queue.display_url, "connected to queue store");
        Ok(queue)
    }

    /// Password-masked URL, safe to log.
    pub fn display_url(&self) -> &str {
        &self.display_url
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

fn record_op(queue: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

#[async_trait]
impl QueueStore for RedisQueue {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }

    async fn pop_blocking(&self, queue: &str, timeout: Duration) -> Result<Option<Popped>> {
        let mut conn = self.conn().await?;
        let secs = timeout.as_secs_f64().max(MIN_POP_TIMEOUT_SECS);

        let reply: Option<(String, Vec<u8>)> = redis::cmd("BRPOP")
            .arg(queue)
            .arg(secs)
            .query_async(&mut *conn)
            .await?;

        record_op(queue, if reply.is_some() { "pop" } else { "pop_timeout" });
        Ok(reply.map(|(queue, payload)| Popped::from_bytes(queue, payload)))
    }

    async fn push(&self, queue: &str, items: &[String]) -> Result<u64> {
        if items.is_empty() {
            return self.len(queue).await;
        }
        let mut conn = self.conn().await?;
        let len: u64 = redis::cmd("LPUSH")
            .arg(queue)
            .arg(items)
            .query_async(&mut *conn)
            .await?;
        record_op(queue, "push");
        debug!(queue, count = items.len(), len, "pushed");
        Ok(len)
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = redis::cmd("LLEN").arg(queue).query_async(&mut *conn).await?;
        record_op(queue, "len");
        Ok(len)
    }

    async fn clear(&self, queue: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: u64 = redis::cmd("DEL").arg(queue).query_async(&mut *conn).await?;
        record_op(queue, "clear");
        Ok(())
    }
}
