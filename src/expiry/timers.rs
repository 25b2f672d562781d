//! Named single-shot timers.
//!
//! At most one timer is live per name; scheduling a name again replaces the
//! previous timer. Firings carry a generation that the owner checks on
//! receipt, so a cancelled or replaced timer can never be observed even if
//! its task won the race to the event queue.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Names of the controller's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Fires when a pre-expiry or retry announcement is due.
    Announce,
    /// Fires when the subject's expiry has been reached.
    Delete,
}

impl std::fmt::Display for TimerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Announce => write!(f, "ANNOUNCE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A timer firing, delivered through the owner's event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    /// Which named timer fired.
    pub key: TimerKey,
    /// Generation of the entry that scheduled the firing.
    pub generation: u64,
}

struct TimerEntry {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Named single-shot timer bookkeeping for one owner.
pub struct TimerService<E> {
    tx: mpsc::UnboundedSender<E>,
    entries: HashMap<TimerKey, TimerEntry>,
    next_generation: u64,
}

impl<E> TimerService<E>
where
    E: From<TimerFired> + Send + 'static,
{
    /// Create a timer service delivering firings through `tx`.
    pub fn new(tx: mpsc::UnboundedSender<E>) -> Self {
        Self {
            tx,
            entries: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Schedule `key` to fire after `delay`, replacing any live entry.
    pub fn schedule(&mut self, key: TimerKey, delay: Duration) {
        self.cancel(key);
        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(E::from(TimerFired { key, generation }));
        });
        tracing::trace!(timer = %key, generation, ?delay, "timer scheduled");
        self.entries.insert(key, TimerEntry { generation, handle });
    }

    /// Cancel the live entry for `key`, if any.
    pub fn cancel(&mut self, key: TimerKey) {
        if let Some(entry) = self.entries.remove(&key) {
            entry.handle.abort();
            tracing::trace!(timer = %key, generation = entry.generation, "timer cancelled");
        }
    }

    /// Check a delivered firing against the live entry.
    ///
    /// Returns true and retires the entry when the generation matches; stale
    /// firings from replaced or cancelled timers return false.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.entries.get(&fired.key) {
            Some(entry) if entry.generation == fired.generation => {
                self.entries.remove(&fired.key);
                true
            }
            _ => false,
        }
    }

    /// Whether a timer is live for `key`.
    pub fn is_scheduled(&self, key: TimerKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Cancel every live entry.
    pub fn cancel_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.handle.abort();
        }
    }
}

impl<E> Drop for TimerService<E> {
    fn drop(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.handle.abort();
        }
    }
}
