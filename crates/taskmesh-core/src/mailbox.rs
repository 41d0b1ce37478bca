//! Bounded mailboxes for queued command and event delivery.
//!
//! Producers enqueue without blocking; a full mailbox rejects the entry
//! and hands it back. The owner drains entries in enqueue order, and at
//! most one thread drains a given mailbox at a time.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Identifies one required interface bound to a provided interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

/// Fixed-capacity FIFO mailbox.
pub struct Mailbox<T> {
    name: String,
    capacity: usize,
    queue: Mutex<VecDeque<(ClientId, T)>>,
    draining: AtomicBool,
}

impl<T> Mailbox<T> {
    /// Create a mailbox holding at most `capacity` entries.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            draining: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.lock().len() >= self.capacity
    }

    /// Enqueue without blocking. Returns the entry back when full.
    pub fn try_push(&self, client: ClientId, item: T) -> Result<(), T> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Err(item);
        }
        queue.push_back((client, item));
        Ok(())
    }

    /// Execute every entry present when the drain starts, oldest first.
    ///
    /// Returns `None` without touching the queue if another thread is
    /// already draining. The queue lock is released while `f` runs, so
    /// producers are never blocked by a slow entry.
    pub fn drain<F: FnMut(T)>(&self, mut f: F) -> Option<usize> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let _guard = DrainGuard(&self.draining);

        let pending = self.queue.lock().len();
        let mut executed = 0;
        while executed < pending {
            let next = self.queue.lock().pop_front();
            match next {
                Some((_, item)) => {
                    f(item);
                    executed += 1;
                }
                None => break,
            }
        }
        Some(executed)
    }

    /// Whether a drain is in progress.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Discard the pending entries of one client, keeping the order of the rest.
    pub fn purge_client(&self, client: ClientId) -> usize {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.retain(|(owner, _)| *owner != client);
        let purged = before - queue.len();
        if purged > 0 {
            debug!("Mailbox {} discarded {} entries of client {:?}", self.name, purged, client);
        }
        purged
    }

    /// Discard every pending entry.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock();
        let count = queue.len();
        queue.clear();
        count
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "mailbox_tests.rs"]
mod tests;
