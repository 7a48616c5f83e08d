//! In-process queue store with the same list semantics as Redis.
//!
//! Used for dry runs and tests. Pops are atomic under the internal mutex,
//! so concurrent consumers sharing one `MemoryQueue` never receive the
//! same item.

use super::{Popped, QueueStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct Lists {
    lists: HashMap<String, VecDeque<String>>,
    /// Number of upcoming operations that will fail with a transport error.
    fail_next: u32,
}

/// Shared in-memory list store.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<Lists>,
    pushed: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` operations fail as if the connection dropped.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    /// Contents of `queue` from head (newest) to tail (oldest).
    pub fn items(&self, queue: &str) -> Vec<String> {
        self.lock()
            .lists
            .get(queue)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lists> {
        // A panic while holding the lock cannot leave the lists half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock the state, consuming one injected failure if any are pending.
    fn checked(&self) -> Result<std::sync::MutexGuard<'_, Lists>> {
        let mut state = self.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(Error::Transport("injected connection failure".into()));
        }
        Ok(state)
    }

    fn try_pop(&self, queue: &str) -> Result<Option<Popped>> {
        let mut state = self.checked()?;
        let payload = state.lists.get_mut(queue).and_then(VecDeque::pop_back);
        if state.lists.get(queue).is_some_and(VecDeque::is_empty) {
            state.lists.remove(queue);
        }
        Ok(payload.map(|payload| Popped {
            queue: queue.to_string(),
            payload,
        }))
    }
}

#[async_trait]
impl QueueStore for MemoryQueue {
    async fn ping(&self) -> Result<()> {
        self.checked().map(|_| ())
    }

    async fn pop_blocking(&self, queue: &str, timeout: Duration) -> Result<Option<Popped>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before looking, so a push between the check
            // and the wait still wakes us.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(popped) = self.try_pop(queue)? {
                return Ok(Some(popped));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn push(&self, queue: &str, items: &[String]) -> Result<u64> {
        let len = {
            let mut state = self.checked()?;
            let list = state.lists.entry(queue.to_string()).or_default();
            for item in items {
                list.push_front(item.clone());
            }
            list.len() as u64
        };
        self.pushed.notify_waiters();
        Ok(len)
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        let state = self.checked()?;
        Ok(state.lists.get(queue).map_or(0, |list| list.len() as u64))
    }

    async fn clear(&self, queue: &str) -> Result<()> {
        self.checked()?.lists.remove(queue);
        Ok(())
    }
}
