//! Per-collection coalescing of change notifications.
//!
//! Each key owns one timer slot. A notification restarts the slot's timer, so
//! a burst inside the window yields a single trigger once the burst settles.
//! Deletes skip the window and trigger at once. Triggers carry a generation
//! number; [`ChangeDebouncer::accept`] rejects triggers from timers that were
//! superseded after they had already fired.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::gateway::ChangeKind;

/// Trigger delivered when a key's window elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger<K> {
    pub key: K,
    pub generation: u64,
}

#[derive(Debug)]
pub enum TimerState {
    Idle,
    Scheduled {
        last_notify_at: Instant,
        generation: u64,
        handle: JoinHandle<()>,
    },
    Fired {
        at: Instant,
        generation: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Immediate,
    Scheduled,
}

#[derive(Debug)]
pub struct ChangeDebouncer<K> {
    default_window: Duration,
    windows: HashMap<K, Duration>,
    slots: HashMap<K, TimerState>,
    next_generation: u64,
    triggers: mpsc::UnboundedSender<Trigger<K>>,
}

impl<K> ChangeDebouncer<K>
where
    K: Copy + Eq + Hash + Send + std::fmt::Debug + 'static,
{
    pub fn new(default_window: Duration, triggers: mpsc::UnboundedSender<Trigger<K>>) -> Self {
        Self {
            default_window,
            windows: HashMap::new(),
            slots: HashMap::new(),
            next_generation: 0,
            triggers,
        }
    }

    #[must_use]
    pub fn with_window(mut self, key: K, window: Duration) -> Self {
        self.windows.insert(key, window);
        self
    }

    pub fn window_for(&self, key: K) -> Duration {
        self.windows.get(&key).copied().unwrap_or(self.default_window)
    }

    pub fn state(&self, key: K) -> &TimerState {
        self.slots.get(&key).unwrap_or(&TimerState::Idle)
    }

    fn cancel(&mut self, key: K) {
        if let Some(TimerState::Scheduled { handle, .. }) = self.slots.remove(&key) {
            handle.abort();
        }
    }

    /// Record a change notification for `key`.
    pub fn notify(&mut self, key: K, kind: ChangeKind) -> Dispatch {
        self.cancel(key);
        self.next_generation += 1;
        let generation = self.next_generation;

        if kind == ChangeKind::Delete {
            tracing::debug!(key = ?key, "delete notification, refreshing immediately");
            self.slots.insert(
                key,
                TimerState::Fired {
                    at: Instant::now(),
                    generation,
                },
            );
            let _ = self.triggers.send(Trigger { key, generation });
            return Dispatch::Immediate;
        }

        let window = self.window_for(key);
        let triggers = self.triggers.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = triggers.send(Trigger { key, generation });
        });
        self.slots.insert(
            key,
            TimerState::Scheduled {
                last_notify_at: Instant::now(),
                generation,
                handle,
            },
        );
        Dispatch::Scheduled
    }

    /// Accept a delivered trigger if it is still current, marking the slot fired.
    pub fn accept(&mut self, trigger: Trigger<K>) -> bool {
        match self.slots.get(&trigger.key) {
            Some(TimerState::Scheduled { generation, .. }) if *generation == trigger.generation => {
                self.slots.insert(
                    trigger.key,
                    TimerState::Fired {
                        at: Instant::now(),
                        generation: trigger.generation,
                    },
                );
                true
            }
            Some(TimerState::Fired { generation, .. }) => *generation == trigger.generation,
            _ => false,
        }
    }

    /// Cancel every pending timer.
    pub fn clear(&mut self) {
        for (_, slot) in self.slots.drain() {
            if let TimerState::Scheduled { handle, .. } = slot {
                handle.abort();
            }
        }
    }
}

impl<K> Drop for ChangeDebouncer<K> {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            if let TimerState::Scheduled { handle, .. } = slot {
                handle.abort();
            }
        }
    }
}
