//! Integration tests for the consumer drain loop, against the in-memory store.

use async_trait::async_trait;
use gridq::consumer::{Consumer, ConsumerConfig, MalformedPolicy, ResultRecord, transform};
use gridq::error::{Error, Result};
use gridq::queue::{MemoryQueue, Popped, QueueStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const INPUT: &str = "in";
const OUTPUT: &str = "out";

fn test_config() -> ConsumerConfig {
    ConsumerConfig {
        input_queue: INPUT.to_string(),
        output_queue: OUTPUT.to_string(),
        node_id: "testnode".to_string(),
        ..ConsumerConfig::default()
    }
}

async fn load(queue: &MemoryQueue, items: impl IntoIterator<Item = impl ToString>) {
    let items: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    queue.push(INPUT, &items).await.unwrap();
}

fn consumer(queue: &Arc<MemoryQueue>, config: ConsumerConfig) -> Consumer {
    let store: Arc<dyn QueueStore> = queue.clone();
    Consumer::new(store.clone(), store, config)
}

fn parsed(records: &[String]) -> Vec<ResultRecord> {
    records
        .iter()
        .map(|r| ResultRecord::parse(r).expect("output record should parse"))
        .collect()
}

// ---------------------------------------------------------------------------
// Fault injection wrapper
// ---------------------------------------------------------------------------

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Wraps a `MemoryQueue` and misbehaves on request.
#[derive(Default)]
struct Faulty {
    inner: Arc<MemoryQueue>,
    pop_failures: AtomicU32,
    push_failures: AtomicU32,
    len_failures: AtomicU32,
    spurious_timeouts: AtomicU32,
    /// Pushed onto the input queue right after an LLEN that returned zero.
    late_item: Mutex<Option<String>>,
}

impl Faulty {
    fn over(inner: Arc<MemoryQueue>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }
}

#[async_trait]
impl QueueStore for Faulty {
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn pop_blocking(&self, queue: &str, timeout: Duration) -> Result<Option<Popped>> {
        if take(&self.pop_failures) {
            return Err(Error::Transport("connection reset".into()));
        }
        if take(&self.spurious_timeouts) {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }
        self.inner.pop_blocking(queue, timeout).await
    }

    async fn push(&self, queue: &str, items: &[String]) -> Result<u64> {
        if take(&self.push_failures) {
            return Err(Error::Transport("broken pipe".into()));
        }
        self.inner.push(queue, items).await
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        if take(&self.len_failures) {
            return Err(Error::Transport("timed out".into()));
        }
        let len = self.inner.len(queue).await?;
        let late = self.late_item.lock().unwrap().take();
        if let Some(item) = late {
            if len == 0 {
                self.inner.push(queue, &[item]).await?;
            } else {
                *self.late_item.lock().unwrap() = Some(item);
            }
        }
        Ok(len)
    }

    async fn clear(&self, queue: &str) -> Result<()> {
        self.inner.clear(queue).await
    }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn pushes_n_colon_n_squared_for_every_item() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, 0..200).await;

    let report = consumer(&queue, test_config()).run().await.unwrap();
    assert_eq!(report.processed, 200);

    let mut records = queue.items(OUTPUT);
    records.sort_by_key(|r| ResultRecord::parse(r).unwrap().n);
    let expected: Vec<String> = (0..200).map(|n| format!("{n}:{}", n * n)).collect();
    assert_eq!(records, expected);
}

#[tokio::test(start_paused = true)]
async fn redriving_an_item_yields_the_same_record() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, ["5", "5"]).await;

    consumer(&queue, test_config()).run().await.unwrap();
    assert_eq!(queue.items(OUTPUT), ["5:25", "5:25"]);
    assert_eq!(transform(5), transform(5));
}

// ---------------------------------------------------------------------------
// Drain and exit
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn drains_exactly_k_items_then_exits_one_timeout_later() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, 0..250).await;

    let config = ConsumerConfig {
        pop_timeout: Duration::from_secs(5),
        ..test_config()
    };
    let report = consumer(&queue, config).run().await.unwrap();

    assert_eq!(report.processed, 250);
    assert_eq!(queue.len(INPUT).await.unwrap(), 0);
    assert_eq!(queue.len(OUTPUT).await.unwrap(), 250);
    // Processing takes no virtual time; what remains is the final pop wait.
    assert!(report.elapsed_secs >= 5.0, "elapsed {}", report.elapsed_secs);
    assert!(report.elapsed_secs < 5.1, "elapsed {}", report.elapsed_secs);
}

#[tokio::test(start_paused = true)]
async fn empty_queue_exits_after_a_single_timeout() {
    let queue = Arc::new(MemoryQueue::new());
    let report = consumer(&queue, test_config()).run().await.unwrap();
    assert_eq!(report.processed, 0);
    assert!(queue.items(OUTPUT).is_empty());
}

#[tokio::test(start_paused = true)]
async fn spurious_timeout_with_items_left_keeps_draining() {
    let memory = Arc::new(MemoryQueue::new());
    load(&memory, 0..10).await;
    let faulty = Faulty::over(memory.clone());
    faulty.spurious_timeouts.store(1, Ordering::SeqCst);
    let store: Arc<dyn QueueStore> = Arc::new(faulty);

    let report = Consumer::new(store.clone(), store, test_config())
        .run()
        .await
        .unwrap();
    assert_eq!(report.processed, 10);
    assert_eq!(memory.len(INPUT).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn item_pushed_after_empty_check_is_left_behind() {
    // The length check and the exit are two separate steps. A producer
    // that writes between them is not seen by this consumer.
    let memory = Arc::new(MemoryQueue::new());
    load(&memory, 0..3).await;
    let faulty = Faulty::over(memory.clone());
    *faulty.late_item.lock().unwrap() = Some("99".to_string());
    let store: Arc<dyn QueueStore> = Arc::new(faulty);

    let report = Consumer::new(store.clone(), store, test_config())
        .run()
        .await
        .unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(memory.items(INPUT), ["99"]);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumers_pop_each_item_exactly_once() {
    const K: i64 = 2000;
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, 0..K).await;

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let config = ConsumerConfig {
                instance_id: i.to_string(),
                output_queue: format!("{OUTPUT}:{i}"),
                pop_timeout: Duration::from_millis(100),
                ..test_config()
            };
            tokio::spawn(consumer(&queue, config).run())
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap().unwrap().processed;
    }
    assert_eq!(total, K as u64);

    let mut seen = HashSet::new();
    for i in 0..4 {
        for record in parsed(&queue.items(&format!("{OUTPUT}:{i}"))) {
            assert!(record.is_consistent());
            assert!(seen.insert(record.n), "item {} processed twice", record.n);
        }
    }
    assert_eq!(seen, (0..K).collect::<HashSet<_>>());
}

// ---------------------------------------------------------------------------
// Progress cadence
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn progress_is_reported_once_per_thousand_items() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, 0..2500).await;

    let report = consumer(&queue, test_config()).run().await.unwrap();
    assert_eq!(report.processed, 2500);
    assert_eq!(report.progress_reports, 2);
}

#[tokio::test(start_paused = true)]
async fn progress_cadence_is_configurable() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, 0..30).await;

    let config = ConsumerConfig {
        progress_every: 10,
        ..test_config()
    };
    let report = consumer(&queue, config).run().await.unwrap();
    assert_eq!(report.progress_reports, 3);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unreachable_store_at_startup_is_fatal() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, 0..5).await;
    queue.fail_next(1);

    let result = consumer(&queue, test_config()).run().await;
    assert!(
        matches!(result, Err(Error::Connection(_))),
        "expected Connection error, got {result:?}"
    );
    assert_eq!(queue.len(INPUT).await.unwrap(), 5);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_without_losing_items() {
    let memory = Arc::new(MemoryQueue::new());
    load(&memory, 0..50).await;
    let faulty = Faulty::over(memory.clone());
    faulty.pop_failures.store(2, Ordering::SeqCst);
    faulty.push_failures.store(3, Ordering::SeqCst);
    faulty.len_failures.store(1, Ordering::SeqCst);
    let store: Arc<dyn QueueStore> = Arc::new(faulty);

    let config = ConsumerConfig {
        error_pause: Duration::from_secs(1),
        ..test_config()
    };
    let report = Consumer::new(store.clone(), store, config)
        .run()
        .await
        .unwrap();

    assert_eq!(report.processed, 50);
    assert_eq!(report.transient_errors, 6);
    assert_eq!(memory.len(OUTPUT).await.unwrap(), 50);
    let unique: HashSet<i64> = parsed(&memory.items(OUTPUT)).iter().map(|r| r.n).collect();
    assert_eq!(unique.len(), 50);
}

#[tokio::test(start_paused = true)]
async fn malformed_items_are_dropped_and_counted() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, ["1", "oops", "2"]).await;

    let report = consumer(&queue, test_config()).run().await.unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.malformed, 1);
    assert_eq!(queue.len(OUTPUT).await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_items_can_be_dead_lettered() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, ["1", "oops", "2.5", "3"]).await;

    let config = ConsumerConfig {
        malformed_policy: MalformedPolicy::DeadLetter("in:dead".to_string()),
        ..test_config()
    };
    let report = consumer(&queue, config).run().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.malformed, 2);
    assert_eq!(queue.items("in:dead"), ["2.5", "oops"]);
}

#[tokio::test(start_paused = true)]
async fn malformed_item_stops_consumer_under_fail_policy() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, ["1", "oops", "2"]).await;

    let config = ConsumerConfig {
        malformed_policy: MalformedPolicy::Fail,
        ..test_config()
    };
    match consumer(&queue, config).run().await {
        Err(Error::Malformed { payload }) => assert_eq!(payload, "oops"),
        other => panic!("expected Malformed error, got {other:?}"),
    }
    assert_eq!(queue.items(OUTPUT), ["1:1"]);
    assert_eq!(queue.items(INPUT), ["2"]);
}

/// A payload as the Redis store hands it over when the stored bytes are
/// not UTF-8.
fn undecodable_payload() -> String {
    Popped::from_bytes(INPUT.to_string(), vec![0xff, 0xfe, b'1']).payload
}

#[tokio::test(start_paused = true)]
async fn non_utf8_items_are_dead_lettered_and_counted() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, ["1".to_string(), undecodable_payload(), "2".to_string()]).await;

    let config = ConsumerConfig {
        malformed_policy: MalformedPolicy::DeadLetter("in:dead".to_string()),
        ..test_config()
    };
    let report = consumer(&queue, config).run().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.transient_errors, 0);
    assert_eq!(queue.items("in:dead"), [undecodable_payload()]);
}

#[tokio::test(start_paused = true)]
async fn non_utf8_item_stops_consumer_under_fail_policy() {
    let queue = Arc::new(MemoryQueue::new());
    load(&queue, [undecodable_payload()]).await;

    let config = ConsumerConfig {
        malformed_policy: MalformedPolicy::Fail,
        ..test_config()
    };
    let result = consumer(&queue, config).run().await;
    assert!(
        matches!(result, Err(Error::Malformed { .. })),
        "got {result:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn separate_input_and_output_stores() {
    let input = Arc::new(MemoryQueue::new());
    let output = Arc::new(MemoryQueue::new());
    load(&input, 0..20).await;

    let report = Consumer::new(input.clone(), output.clone(), test_config())
        .run()
        .await
        .unwrap();
    assert_eq!(report.processed, 20);
    assert_eq!(output.len(OUTPUT).await.unwrap(), 20);
    assert_eq!(input.len(OUTPUT).await.unwrap(), 0);
}
