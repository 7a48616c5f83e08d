//! Typed configuration from environment variables.
//!
//! Loads once at startup. These are the same variables the grid node
//! injects into every consumer instance it launches, so every one of them
//! has a default and a bare `gridq consume` works against a local Redis.
//! Queue store URLs may carry passwords and are wrapped in
//! `secrecy::SecretString` to keep them out of logs.

pub mod secrets;

use crate::consumer::{ConsumerConfig, MalformedPolicy};
use crate::error::{Error, Result};
use secrecy::SecretString;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_INPUT_QUEUE: &str = "test:input";
pub const DEFAULT_OUTPUT_QUEUE: &str = "test:output";

/// Node ids are usually UUIDs; only a short prefix goes into log tags.
const NODE_ID_DISPLAY_LEN: usize = 8;

#[derive(Debug)]
pub struct Config {
    pub input_url: SecretString,
    pub output_url: SecretString,
    pub input_queue: String,
    pub output_queue: String,
    pub instance_id: String,
    pub node_id: String,
    pub total_tasks: u64,
    pub batch_size: usize,
    pub pop_timeout: Duration,
    pub error_pause: Duration,
    pub progress_every: u64,
    pub monitor_interval: Duration,
    pub malformed_policy: MalformedPolicy,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let input_url = var("INPUT_REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
        let output_url = var("OUTPUT_REDIS_URL").unwrap_or_else(|| input_url.clone());
        let input_queue = var("INPUT_QUEUE").unwrap_or_else(|| DEFAULT_INPUT_QUEUE.to_string());

        let malformed_policy = match var("MALFORMED_POLICY").as_deref() {
            None | Some("drop") => MalformedPolicy::Drop,
            Some("dead-letter") => MalformedPolicy::DeadLetter(
                var("DEAD_LETTER_QUEUE").unwrap_or_else(|| format!("{input_queue}:dead")),
            ),
            Some("fail") => MalformedPolicy::Fail,
            Some(other) => {
                return Err(Error::Config(format!(
                    "MALFORMED_POLICY must be one of drop, dead-letter, fail (got {other:?})"
                )));
            }
        };

        let batch_size: usize = parse_var(&var, "BATCH_SIZE", 1000)?;
        if batch_size == 0 {
            return Err(Error::Config("BATCH_SIZE must be greater than zero".into()));
        }
        let progress_every: u64 = parse_var(&var, "PROGRESS_EVERY", 1000)?;
        if progress_every == 0 {
            return Err(Error::Config(
                "PROGRESS_EVERY must be greater than zero".into(),
            ));
        }

        Ok(Self {
            input_url: SecretString::from(input_url),
            output_url: SecretString::from(output_url),
            input_queue,
            output_queue: var("OUTPUT_QUEUE").unwrap_or_else(|| DEFAULT_OUTPUT_QUEUE.to_string()),
            instance_id: var("INSTANCE_ID").unwrap_or_else(|| "0".to_string()),
            node_id: short_node_id(&var("NODE_ID").unwrap_or_else(|| "unknown".to_string())),
            total_tasks: parse_var(&var, "TOTAL_TASKS", 1_000_000)?,
            batch_size,
            pop_timeout: seconds_var(&var, "POP_TIMEOUT_SECS", 5.0)?,
            error_pause: seconds_var(&var, "ERROR_PAUSE_SECS", 1.0)?,
            progress_every,
            monitor_interval: seconds_var(&var, "MONITOR_INTERVAL_SECS", 1.0)?,
            malformed_policy,
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Drain-loop settings derived from this configuration.
    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            input_queue: self.input_queue.clone(),
            output_queue: self.output_queue.clone(),
            node_id: self.node_id.clone(),
            instance_id: self.instance_id.clone(),
            pop_timeout: self.pop_timeout,
            error_pause: self.error_pause,
            progress_every: self.progress_every,
            malformed_policy: self.malformed_policy.clone(),
        }
    }
}

fn short_node_id(node_id: &str) -> String {
    node_id.chars().take(NODE_ID_DISPLAY_LEN).collect()
}

fn parse_var<F, T>(var: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
    }
}

fn seconds_var<F>(var: &F, name: &str, default: f64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: f64 = parse_var(var, name, default)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("{name}={secs} is not a valid duration: {e}")))
}
