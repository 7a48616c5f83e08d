//! Throughput tracking for one consumer instance.

use std::time::Duration;
use tokio::time::Instant;

/// A progress report, produced once every `every` items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub processed: u64,
    pub rate_per_sec: f64,
}

/// Counts processed items and decides when to report.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    every: u64,
    processed: u64,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(every: u64) -> Self {
        Self::started_at(every, Instant::now())
    }

    pub fn started_at(every: u64, started: Instant) -> Self {
        Self {
            every: every.max(1),
            processed: 0,
            started,
        }
    }

    /// Count one processed item. Returns a report on every `every`-th item.
    pub fn record(&mut self) -> Option<Progress> {
        self.processed += 1;
        (self.processed % self.every == 0).then(|| Progress {
            processed: self.processed,
            rate_per_sec: self.rate_per_sec(),
        })
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn rate_per_sec(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}
