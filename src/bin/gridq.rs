//! gridq CLI: producer, consumer, and monitor for the task grid test run.

use clap::{Parser, Subcommand};
use gridq::config::Config;
use gridq::config::secrets::{ExposeSecret, display_url};
use gridq::consumer::Consumer;
use gridq::demo::run_demo;
use gridq::monitor::{Monitor, group_thousands};
use gridq::producer::Producer;
use gridq::queue::{QueueStore, RedisQueue};
use gridq::telemetry::{TelemetryConfig, init_telemetry};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gridq", about = "Task grid test harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clear the input queue and load it with 0..TOTAL_TASKS
    Produce {
        /// Number of tasks (overrides TOTAL_TASKS)
        #[arg(long)]
        total: Option<u64>,
        /// Items per LPUSH (overrides BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drain the input queue, pushing n:n*n results, then exit
    Consume {
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch queue depths until Ctrl+C
    Monitor {
        /// Poll interval in seconds (overrides MONITOR_INTERVAL_SECS)
        #[arg(long)]
        interval: Option<f64>,
    },
    /// Run producer and consumers in-process against an in-memory store
    Demo {
        #[arg(long, default_value_t = 10_000)]
        total: u64,
        /// Number of concurrent consumers
        #[arg(long, default_value_t = 4)]
        consumers: usize,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Produce { .. } => "producer",
            Command::Consume { .. } => "consumer",
            Command::Monitor { .. } => "monitor",
            Command::Demo { .. } => "demo",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: format!("gridq-{}", cli.command.name()),
        instance: format!("{}:{}", config.node_id, config.instance_id),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Produce {
            total,
            batch_size,
            json,
        } => {
            cmd_produce(
                &config,
                total.unwrap_or(config.total_tasks),
                batch_size.unwrap_or(config.batch_size),
                json,
            )
            .await
        }
        Command::Consume { json } => cmd_consume(&config, json).await,
        Command::Monitor { interval } => {
            let interval = match interval {
                Some(secs) => Duration::try_from_secs_f64(secs)
                    .map_err(|e| anyhow::anyhow!("invalid --interval {secs}: {e}"))?,
                None => config.monitor_interval,
            };
            cmd_monitor(&config, interval).await
        }
        Command::Demo {
            total,
            consumers,
            json,
        } => cmd_demo(&config, total, consumers, json).await,
    }
}

async fn cmd_produce(
    config: &Config,
    total: u64,
    batch_size: usize,
    json: bool,
) -> anyhow::Result<()> {
    println!("Connecting to Redis: {}", display_url(&config.input_url));
    println!("Target queue: {}", config.input_queue);
    println!("Total tasks: {}", group_thousands(total));

    let store: Arc<dyn QueueStore> = Arc::new(RedisQueue::connect(&config.input_url).await?);
    let bar = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total).with_style(
            ProgressStyle::with_template(
                "Pushing {bar:40.cyan/blue} {human_pos}/{human_len} [{elapsed_precise}] {per_sec}",
            )?
            .progress_chars("=> "),
        )
    };
    let report = Producer::new(store, &config.input_queue)
        .with_progress(bar)
        .run(total, batch_size)
        .await?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Done! {} tasks pushed in {:.2}s ({} tasks/s)",
            group_thousands(report.pushed),
            report.elapsed_secs,
            group_thousands(report.rate_per_sec() as u64)
        );
        println!("  Queue length: {}", group_thousands(report.queue_len));
    }
    Ok(())
}

/// Connect the input and output stores, sharing one pool when both URLs
/// point at the same server.
async fn connect_stores(
    config: &Config,
) -> anyhow::Result<(Arc<dyn QueueStore>, Arc<dyn QueueStore>)> {
    let input: Arc<dyn QueueStore> = Arc::new(RedisQueue::connect(&config.input_url).await?);
    let output: Arc<dyn QueueStore> =
        if config.output_url.expose_secret() == config.input_url.expose_secret() {
            input.clone()
        } else {
            Arc::new(RedisQueue::connect(&config.output_url).await?)
        };
    Ok((input, output))
}

async fn cmd_consume(config: &Config, json: bool) -> anyhow::Result<()> {
    let (input, output) = connect_stores(config).await?;
    let report = Consumer::new(input, output, config.consumer_config())
        .run()
        .await?;

    if json {
        print_json(&report)?;
    }
    Ok(())
}

async fn cmd_monitor(config: &Config, interval: Duration) -> anyhow::Result<()> {
    println!("Task Grid Monitor");
    println!("{}", "=".repeat(40));
    println!();

    let (input, output) = connect_stores(config).await?;
    let monitor = Monitor::new(
        input,
        output,
        &config.input_queue,
        &config.output_queue,
        interval,
    );

    let handle = monitor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        handle.shutdown();
    });

    monitor.run(&mut std::io::stdout()).await?;
    Ok(())
}

async fn cmd_demo(
    config: &Config,
    total: u64,
    consumers: usize,
    json: bool,
) -> anyhow::Result<()> {
    let report = run_demo(total, config.batch_size, consumers, &config.consumer_config()).await?;

    if json {
        print_json(&report)?;
    } else {
        for c in &report.consumers {
            println!(
                "[{}:{}] processed {} in {:.1}s",
                c.node_id, c.instance_id, c.processed, c.elapsed_secs
            );
        }
        println!(
            "{} results, {}",
            group_thousands(report.results),
            if report.verified { "verified" } else { "MISMATCH" }
        );
    }
    if !report.verified {
        anyhow::bail!("output queue does not match the produced work items");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
