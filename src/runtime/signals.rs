//! Keyed one-shot signal channels for external events.
//!
//! A channel exists per key and resolves at most once. Channels materialize
//! on first touch from either side, so a signal that arrives before anyone
//! waits is retained rather than lost (providers routinely answer a callback
//! before the dispatcher starts waiting on it).

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Fan-in point for externally signaled events, keyed by `K`.
///
/// Resolution is idempotent: the first [`signal`](Self::signal) per key wins,
/// later signals are no-ops and never alter the recorded value.
#[derive(Debug)]
pub struct SignalHub<K: Eq + Hash, T> {
    channels: DashMap<K, Arc<watch::Sender<Option<T>>>>,
}

impl<K, T> Default for SignalHub<K, T>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }
}

impl<K, T> SignalHub<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, key: &K) -> Arc<watch::Sender<Option<T>>> {
        self.channels
            .entry(key.clone())
            .or_insert_with(|| Arc::new(watch::channel(None).0))
            .clone()
    }

    /// Resolve the channel for `key`. Returns `false` when the channel was
    /// already resolved, in which case the stored value is left untouched.
    pub fn signal(&self, key: &K, value: T) -> bool {
        let tx = self.channel(key);
        let mut pending = Some(value);
        let resolved = tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = pending.take();
                true
            } else {
                false
            }
        });
        if !resolved {
            debug!(key = ?key, "Ignoring repeat signal on resolved channel");
        }
        resolved
    }

    /// Block until the channel for `key` resolves or `ceiling` elapses.
    ///
    /// Returns `None` on timeout. A channel resolved before the wait started
    /// returns immediately.
    pub async fn wait(&self, key: &K, ceiling: Duration) -> Option<T> {
        let tx = self.channel(key);
        let mut rx = tx.subscribe();
        let resolved = async move {
            loop {
                if let Some(value) = rx.borrow_and_update().clone() {
                    return value;
                }
                // We hold a sender clone, so changed() cannot error out.
                if rx.changed().await.is_err() {
                    unreachable!("signal channel sender dropped while waiting");
                }
            }
        };
        tokio::time::timeout(ceiling, resolved).await.ok()
    }

    /// Peek at the recorded value without waiting.
    pub fn resolved(&self, key: &K) -> Option<T> {
        self.channels
            .get(key)
            .and_then(|tx| tx.borrow().clone())
    }
}
