//! Cancellable one-shot timers used to pace panel mutations
//!
//! The volume panel inserts rows for new devices on its own schedule, so a
//! removal issued straight from a device-added callback can be overwritten by
//! the panel's insertion. Removals are therefore deferred by a short settle
//! delay. The delay is a race mitigation, not a guarantee.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Wait without blocking the event loop
pub async fn delay(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Identifies one scheduling of a key. A timer that fires after its key was
/// cancelled or rescheduled carries a ticket that is no longer current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

struct Pending {
    ticket: Ticket,
    handle: JoinHandle<()>,
}

/// One-shot timers keyed by `K`, at most one pending per key
pub struct SettleScheduler<K> {
    pending: HashMap<K, Pending>,
    next_ticket: u64,
    disposed: bool,
}

impl<K> SettleScheduler<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_ticket: 0,
            disposed: false,
        }
    }

    /// Run `on_elapsed` after `after`, replacing any timer pending for `key`.
    ///
    /// Must be called from within a tokio runtime. Returns `None` once the
    /// scheduler has been disposed.
    pub fn schedule<F>(&mut self, key: K, after: Duration, on_elapsed: F) -> Option<Ticket>
    where
        F: FnOnce(Ticket) + Send + 'static,
    {
        if self.disposed {
            debug!(?key, "Scheduler disposed, refusing new timer");
            return None;
        }

        self.cancel(&key);

        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;

        let handle = tokio::spawn(async move {
            delay(after).await;
            on_elapsed(ticket);
        });

        trace!(?key, ?after, "Timer scheduled");
        self.pending.insert(key, Pending { ticket, handle });
        Some(ticket)
    }

    /// Abort the timer pending for `key`, if any
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some(pending) => {
                pending.handle.abort();
                trace!(?key, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Consume a fired timer. Returns `false` when `ticket` is stale.
    pub fn complete(&mut self, key: &K, ticket: Ticket) -> bool {
        match self.pending.get(key) {
            Some(pending) if pending.ticket == ticket => {
                self.pending.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending_where(&self, mut pred: impl FnMut(&K) -> bool) -> bool {
        self.pending.keys().any(|key| pred(key))
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Abort every pending timer and refuse new ones
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
        self.disposed = true;
        debug!(cancelled = count, "Scheduler disposed");
    }
}

impl<K> Default for SettleScheduler<K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for SettleScheduler<K> {
    fn drop(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }
}
