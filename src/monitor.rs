//! Monitor: polls queue lengths and renders live progress.
//!
//! Read-only. Only LLEN is ever issued against the store.

use crate::error::Result;
use crate::queue::QueueStore;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::warn;

/// Queue depths at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Items still waiting in the input queue.
    pub pending: u64,
    /// Results sitting in the output queue.
    pub done: u64,
}

impl Snapshot {
    pub fn total(&self) -> u64 {
        self.pending + self.done
    }

    /// Percentage of known work that is done, or `None` with no work at all.
    pub fn progress_percent(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.done as f64 / total as f64 * 100.0),
        }
    }

    /// The live status line.
    pub fn render(&self) -> String {
        match self.progress_percent() {
            Some(progress) => format!(
                "Pending: {:>10}  |  Done: {:>10}  |  Progress: {:>5.1}%",
                group_thousands(self.pending),
                group_thousands(self.done),
                progress
            ),
            None => "Waiting for tasks...".to_string(),
        }
    }
}

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Polls both queues on a fixed interval until [`Monitor::shutdown`].
///
/// The input and output queues may live on different stores; pass the
/// same store twice when they do not.
pub struct Monitor {
    input: Arc<dyn QueueStore>,
    output: Arc<dyn QueueStore>,
    input_queue: String,
    output_queue: String,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Clone for Monitor {
    fn clone(&self) -> Self {
        Self {
            input: Arc::clone(&self.input),
            output: Arc::clone(&self.output),
            input_queue: self.input_queue.clone(),
            output_queue: self.output_queue.clone(),
            interval: self.interval,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl Monitor {
    pub fn new(
        input: Arc<dyn QueueStore>,
        output: Arc<dyn QueueStore>,
        input_queue: impl Into<String>,
        output_queue: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            input,
            output,
            input_queue: input_queue.into(),
            output_queue: output_queue.into(),
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the monitor to stop after its current poll.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            pending: self.input.len(&self.input_queue).await?,
            done: self.output.len(&self.output_queue).await?,
        })
    }

    /// Render progress to `out` until shut down. Returns the final snapshot.
    ///
    /// A failed initial or final poll is an error; failed polls in between
    /// are logged and skipped.
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<Snapshot> {
        let initial = self.snapshot().await?;
        writeln!(
            out,
            "Initial state: {} pending, {} done\n\nMonitoring... (Ctrl+C to stop)\n",
            group_thousands(initial.pending),
            group_thousands(initial.done)
        )?;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = ticker.tick() => match self.snapshot().await {
                    Ok(snapshot) => {
                        write!(out, "\r{}", snapshot.render())?;
                        out.flush()?;
                    }
                    Err(e) if e.is_transient() => warn!(error = %e, "poll failed"),
                    Err(e) => return Err(e),
                },
            }
        }

        let last = self.snapshot().await?;
        writeln!(
            out,
            "\n\nMonitoring stopped.\nFinal: {} pending, {} done",
            group_thousands(last.pending),
            group_thousands(last.done)
        )?;
        Ok(last)
    }
}
