//! Producer: loads a dense range of work items into the input queue.

use crate::error::{Error, Result};
use crate::queue::QueueStore;
use crate::telemetry::metrics;
use indicatif::ProgressBar;
use opentelemetry::KeyValue;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Summary of a finished load.
#[derive(Debug, Clone, Serialize)]
pub struct ProduceReport {
    pub queue: String,
    pub pushed: u64,
    pub batches: u64,
    pub elapsed_secs: f64,
    /// Input queue length observed right after the last batch.
    pub queue_len: u64,
}

impl ProduceReport {
    pub fn rate_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.pushed as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

pub struct Producer {
    store: Arc<dyn QueueStore>,
    queue: String,
    progress: ProgressBar,
}

impl Producer {
    pub fn new(store: Arc<dyn QueueStore>, queue: impl Into<String>) -> Self {
        Self {
            store,
            queue: queue.into(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance `bar` as batches land. Its length is set to the task total
    /// when the run starts.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    /// Clear the queue, then push `0..total` as decimal strings in batches.
    ///
    /// The clear is destructive: anything already in the queue is lost.
    pub async fn run(&self, total: u64, batch_size: usize) -> Result<ProduceReport> {
        if batch_size == 0 {
            return Err(Error::Config("batch size must be greater than zero".into()));
        }
        self.store
            .ping()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        self.store.clear(&self.queue).await?;
        info!(queue = %self.queue, total, batch_size, "queue cleared, pushing tasks");

        self.progress.set_length(total);
        self.progress.set_position(0);
        let started = Instant::now();
        let mut batches = 0u64;
        let mut batch = Vec::with_capacity(batch_size);
        for n in 0..total {
            batch.push(n.to_string());
            if batch.len() >= batch_size {
                self.push_batch(&batch, n + 1, total).await?;
                batches += 1;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            self.push_batch(&batch, total, total).await?;
            batches += 1;
        }
        self.progress.finish();

        let report = ProduceReport {
            queue: self.queue.clone(),
            pushed: total,
            batches,
            elapsed_secs: started.elapsed().as_secs_f64(),
            queue_len: self.store.len(&self.queue).await?,
        };
        info!(
            pushed = report.pushed,
            elapsed_secs = (report.elapsed_secs * 100.0).round() / 100.0,
            rate_per_sec = report.rate_per_sec().round(),
            queue_len = report.queue_len,
            "done"
        );
        Ok(report)
    }

    async fn push_batch(&self, batch: &[String], pushed: u64, total: u64) -> Result<()> {
        self.store.push(&self.queue, batch).await?;
        metrics::items_pushed().add(
            batch.len() as u64,
            &[KeyValue::new("queue", self.queue.clone())],
        );
        self.progress.inc(batch.len() as u64);
        debug!(pushed, total, "batch pushed");
        Ok(())
    }
}
