//! In-process dry run of the whole grid against a [`MemoryQueue`].
//!
//! Loads the input queue, drains it with several concurrent consumers,
//! then collects and checks the output queue.

use crate::consumer::{Consumer, ConsumerConfig, DrainReport, ResultRecord};
use crate::error::{Error, Result};
use crate::producer::{ProduceReport, Producer};
use crate::queue::{MemoryQueue, QueueStore};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub produced: ProduceReport,
    pub consumers: Vec<DrainReport>,
    /// Records found in the output queue.
    pub results: u64,
    /// Every input appeared exactly once with the correct square.
    pub verified: bool,
}

/// Run producer and `consumers` drain loops to completion in one process.
///
/// `base` supplies queue names and timings; each consumer gets its index
/// as instance id.
pub async fn run_demo(
    total: u64,
    batch_size: usize,
    consumers: usize,
    base: &ConsumerConfig,
) -> Result<DemoReport> {
    let store = Arc::new(MemoryQueue::new());
    let shared: Arc<dyn QueueStore> = store.clone();

    let produced = Producer::new(shared.clone(), &base.input_queue)
        .run(total, batch_size)
        .await?;

    let handles: Vec<_> = (0..consumers.max(1))
        .map(|i| {
            let config = ConsumerConfig {
                instance_id: i.to_string(),
                ..base.clone()
            };
            tokio::spawn(Consumer::new(shared.clone(), shared.clone(), config).run())
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let report = handle
            .await
            .map_err(|e| Error::Other(format!("consumer task failed: {e}")))??;
        reports.push(report);
    }

    let records = store.items(&base.output_queue);
    let verified = verify_results(&records, total);
    info!(results = records.len(), verified, "demo finished");

    Ok(DemoReport {
        produced,
        consumers: reports,
        results: records.len() as u64,
        verified,
    })
}

/// Check that `records` is exactly `{ "n:n*n" | n in 0..total }`.
pub fn verify_results(records: &[String], total: u64) -> bool {
    if records.len() as u64 != total {
        return false;
    }
    let mut seen = HashSet::with_capacity(records.len());
    records.iter().all(|raw| match ResultRecord::parse(raw) {
        Some(r) => r.is_consistent() && r.n >= 0 && (r.n as u64) < total && seen.insert(r.n),
        None => false,
    })
}
