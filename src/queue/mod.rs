//! Queue store abstraction.
//!
//! The producer, every consumer instance, and the monitor coordinate only
//! through a shared list store. Correctness across instances rests on the
//! store's atomic pop; nothing here adds locking of its own.
//!
//! Items are pushed on the left and popped from the right, so a single
//! producer and a single consumer see FIFO order.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// An item removed from a queue by a blocking pop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popped {
    /// Name of the queue the item came from.
    pub queue: String,
    pub payload: String,
}

impl Popped {
    /// Build from the raw bytes a store handed back.
    ///
    /// The item is already off the queue at this point, so bytes that are
    /// not UTF-8 are decoded lossily rather than rejected. The replacement
    /// characters can never parse as an integer, which sends the item down
    /// the malformed path where it is counted.
    pub fn from_bytes(queue: String, payload: Vec<u8>) -> Self {
        let payload = match String::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        Self { queue, payload }
    }
}

/// The list primitives the grid relies on.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Lightweight connectivity check.
    async fn ping(&self) -> Result<()>;

    /// Atomically remove one item from the tail of `queue`, waiting up to
    /// `timeout` for one to arrive. `Ok(None)` means the wait timed out.
    async fn pop_blocking(&self, queue: &str, timeout: Duration) -> Result<Option<Popped>>;

    /// Push items onto the head of `queue`. Returns the new length.
    async fn push(&self, queue: &str, items: &[String]) -> Result<u64>;

    /// Current number of items in `queue`.
    async fn len(&self, queue: &str) -> Result<u64>;

    /// Delete `queue` and everything in it.
    async fn clear(&self, queue: &str) -> Result<()>;
}
