//! The drain loop: pop, square, push, until the input queue is empty.
//!
//! ```text
//!   Running ──pop ok──▶ Running
//!   Running ──timeout─▶ DrainingCheck ──len > 0──▶ Running
//!                                     └─len == 0─▶ Done
//! ```
//!
//! "Empty" is decided by a single LLEN after a pop timeout. An item pushed
//! after that LLEN is left for someone else; the harness accepts this.

use super::progress::ProgressTracker;
use super::transform::{parse_item, transform};
use crate::error::{Error, Result};
use crate::queue::QueueStore;
use crate::telemetry::drain::{record_state_transition, start_consumer_span};
use crate::telemetry::metrics;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, warn};

/// What to do with a popped payload that is not an integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Log, count, and discard.
    Drop,
    /// Log, count, and push the raw payload onto the named queue.
    DeadLetter(String),
    /// Stop the consumer with [`Error::Malformed`].
    Fail,
}

impl MalformedPolicy {
    fn label(&self) -> &'static str {
        match self {
            MalformedPolicy::Drop => "drop",
            MalformedPolicy::DeadLetter(_) => "dead-letter",
            MalformedPolicy::Fail => "fail",
        }
    }
}

/// Configuration for one consumer instance.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub input_queue: String,
    pub output_queue: String,
    pub node_id: String,
    pub instance_id: String,
    /// Wait bound for each blocking pop.
    pub pop_timeout: Duration,
    /// Pause after a transient queue store failure.
    pub error_pause: Duration,
    /// Emit a progress line every this many processed items.
    pub progress_every: u64,
    pub malformed_policy: MalformedPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            input_queue: crate::config::DEFAULT_INPUT_QUEUE.to_string(),
            output_queue: crate::config::DEFAULT_OUTPUT_QUEUE.to_string(),
            node_id: "unknown".to_string(),
            instance_id: "0".to_string(),
            pop_timeout: Duration::from_secs(5),
            error_pause: Duration::from_secs(1),
            progress_every: 1000,
            malformed_policy: MalformedPolicy::Drop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Running,
    DrainingCheck,
    Done,
}

impl DrainState {
    pub fn as_str(self) -> &'static str {
        match self {
            DrainState::Running => "running",
            DrainState::DrainingCheck => "draining_check",
            DrainState::Done => "done",
        }
    }
}

/// Summary of a finished drain run.
#[derive(Debug, Clone, Serialize)]
pub struct DrainReport {
    pub node_id: String,
    pub instance_id: String,
    pub processed: u64,
    pub malformed: u64,
    pub transient_errors: u64,
    pub progress_reports: u64,
    pub elapsed_secs: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DrainReport {
    pub fn rate_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.processed as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// A push that has not reached the store yet.
///
/// Kept across transient failures so a popped item is never lost between
/// its pop and its push.
#[derive(Debug)]
struct PendingPush {
    queue: String,
    value: String,
    dead_letter: bool,
}

/// One consumer instance. All counters are owned here, so several
/// consumers in one process never share state.
pub struct Consumer {
    input: Arc<dyn QueueStore>,
    output: Arc<dyn QueueStore>,
    config: ConsumerConfig,
    progress: ProgressTracker,
    pending: Option<PendingPush>,
    malformed: u64,
    transient_errors: u64,
    progress_reports: u64,
}

impl Consumer {
    pub fn new(
        input: Arc<dyn QueueStore>,
        output: Arc<dyn QueueStore>,
        config: ConsumerConfig,
    ) -> Self {
        let progress = ProgressTracker::new(config.progress_every);
        Self {
            input,
            output,
            config,
            progress,
            pending: None,
            malformed: 0,
            transient_errors: 0,
            progress_reports: 0,
        }
    }

    /// Drain the input queue to completion.
    ///
    /// Returns once a pop times out and the input queue is then observed
    /// empty. Transient store failures are logged and retried. An
    /// unreachable store at startup, a reply the store should never send,
    /// or a malformed item under [`MalformedPolicy::Fail`] ends the run
    /// with an error.
    pub async fn run(mut self) -> Result<DrainReport> {
        let span = start_consumer_span(&self.config.node_id, &self.config.instance_id);
        let started_at = Utc::now();
        let state_span = span.clone();

        async move {
            info!(
                input = %self.config.input_queue,
                output = %self.config.output_queue,
                "consumer starting"
            );
            for store in [&self.input, &self.output] {
                store
                    .ping()
                    .await
                    .map_err(|e| Error::Connection(e.to_string()))?;
            }
            info!("queue store connected");

            self.progress = ProgressTracker::new(self.config.progress_every);
            let mut state = DrainState::Running;
            while state != DrainState::Done {
                let next = match self.step(state).await {
                    Ok(next) => next,
                    Err(e) if e.is_transient() => {
                        self.transient_errors += 1;
                        metrics::transient_errors().add(1, &[self.instance_label()]);
                        warn!(error = %e, "queue store error, retrying");
                        tokio::time::sleep(self.config.error_pause).await;
                        DrainState::Running
                    }
                    Err(e) => {
                        error!(error = %e, "consumer stopping");
                        return Err(e);
                    }
                };
                if next != state {
                    record_state_transition(&state_span, state.as_str(), next.as_str());
                }
                state = next;
            }

            let report = self.report(started_at);
            info!(
                processed = report.processed,
                malformed = report.malformed,
                elapsed_secs = (report.elapsed_secs * 10.0).round() / 10.0,
                "queue empty, exiting"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn step(&mut self, state: DrainState) -> Result<DrainState> {
        match state {
            DrainState::Running => {
                self.flush_pending().await?;
                match self
                    .input
                    .pop_blocking(&self.config.input_queue, self.config.pop_timeout)
                    .await?
                {
                    Some(popped) => {
                        self.handle(popped.payload)?;
                        self.flush_pending().await?;
                        Ok(DrainState::Running)
                    }
                    None => Ok(DrainState::DrainingCheck),
                }
            }
            DrainState::DrainingCheck => match self.input.len(&self.config.input_queue).await? {
                0 => Ok(DrainState::Done),
                remaining => {
                    debug!(remaining, "pop timed out but queue is not empty");
                    Ok(DrainState::Running)
                }
            },
            DrainState::Done => Ok(DrainState::Done),
        }
    }

    /// Turn a popped payload into the push it requires, if any.
    fn handle(&mut self, payload: String) -> Result<()> {
        match parse_item(&payload) {
            Ok(n) => {
                self.pending = Some(PendingPush {
                    queue: self.config.output_queue.clone(),
                    value: transform(n).to_string(),
                    dead_letter: false,
                });
                Ok(())
            }
            Err(err) => {
                self.malformed += 1;
                metrics::items_malformed().add(
                    1,
                    &[
                        self.instance_label(),
                        KeyValue::new("policy", self.config.malformed_policy.label()),
                    ],
                );
                match &self.config.malformed_policy {
                    MalformedPolicy::Drop => {
                        warn!(payload = %payload, "dropping malformed work item");
                        Ok(())
                    }
                    MalformedPolicy::DeadLetter(queue) => {
                        warn!(
                            payload = %payload,
                            dead_letter = %queue,
                            "dead-lettering malformed work item"
                        );
                        self.pending = Some(PendingPush {
                            queue: queue.clone(),
                            value: payload,
                            dead_letter: true,
                        });
                        Ok(())
                    }
                    MalformedPolicy::Fail => Err(err),
                }
            }
        }
    }

    async fn flush_pending(&mut self) -> Result<()> {
        let Some(push) = self.pending.take() else {
            return Ok(());
        };
        // Dead letters go back to the input side; results to the output side.
        let store = if push.dead_letter {
            &self.input
        } else {
            &self.output
        };
        let pushed = store
            .push(&push.queue, std::slice::from_ref(&push.value))
            .await;
        if let Err(e) = pushed {
            self.pending = Some(push);
            return Err(e);
        }
        if !push.dead_letter {
            self.on_processed();
        }
        Ok(())
    }

    fn on_processed(&mut self) {
        metrics::items_processed().add(1, &[self.instance_label()]);
        if let Some(p) = self.progress.record() {
            self.progress_reports += 1;
            info!(
                processed = p.processed,
                rate_per_sec = p.rate_per_sec.round(),
                "progress"
            );
        }
    }

    fn instance_label(&self) -> KeyValue {
        KeyValue::new(
            "instance",
            format!("{}:{}", self.config.node_id, self.config.instance_id),
        )
    }

    fn report(&self, started_at: DateTime<Utc>) -> DrainReport {
        DrainReport {
            node_id: self.config.node_id.clone(),
            instance_id: self.config.instance_id.clone(),
            processed: self.progress.processed(),
            malformed: self.malformed,
            transient_errors: self.transient_errors,
            progress_reports: self.progress_reports,
            elapsed_secs: self.progress.elapsed().as_secs_f64(),
            started_at,
            finished_at: Utc::now(),
        }
    }
}
