//! Metric instrument factories for gridq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"gridq"` meter. Without an
//! OTLP endpoint the global provider is a no-op and recording is free.

use opentelemetry::metrics::{Counter, Meter};

/// Returns the shared meter for gridq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("gridq")
}

/// Counter: work items transformed and pushed to the output queue.
/// Labels: `instance`.
pub fn items_processed() -> Counter<u64> {
    meter()
        .u64_counter("gridq.items.processed")
        .with_description("Number of work items processed")
        .build()
}

/// Counter: popped payloads that did not parse as an integer.
/// Labels: `instance`, `policy`.
pub fn items_malformed() -> Counter<u64> {
    meter()
        .u64_counter("gridq.items.malformed")
        .with_description("Number of malformed work items popped")
        .build()
}

/// Counter: work items pushed by the producer.
/// Labels: `queue`.
pub fn items_pushed() -> Counter<u64> {
    meter()
        .u64_counter("gridq.items.pushed")
        .with_description("Number of work items enqueued")
        .build()
}

/// Counter: queue-level operations (pop, pop_timeout, push, len, clear).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("gridq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: transient queue-store failures absorbed by the drain loop.
/// Labels: `instance`.
pub fn transient_errors() -> Counter<u64> {
    meter()
        .u64_counter("gridq.errors.transient")
        .with_description("Number of transient queue store failures")
        .build()
}
