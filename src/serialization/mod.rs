//! # Per-Resource Command Serialization
//!
//! Guarantees at most one in-flight orchestration mutates a given resource
//! key at a time, without busy-waiting callers.
//!
//! Each resource key owns a slot holding the most recently admitted command
//! id. Admission swaps the slot inside a per-key critical section and hands
//! the previous id back — but only while that predecessor is still live.
//! The admitted successor then waits on the predecessor through the
//! completion monitor instead of polling the slot.
//!
//! Waits cannot cycle: every orchestration waits only on its immediate
//! predecessor, which was admitted earlier and cannot depend on a command
//! that did not exist at its own admission time.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::runtime::InstanceStatusStore;

/// One admission slot per resource key, holding the current command id.
#[derive(Debug)]
pub struct CommandSlots {
    slots: DashMap<String, Arc<Mutex<Option<Uuid>>>>,
    statuses: Arc<InstanceStatusStore>,
}

impl CommandSlots {
    pub fn new(statuses: Arc<InstanceStatusStore>) -> Self {
        Self {
            slots: DashMap::new(),
            statuses,
        }
    }

    /// Atomically admit `command_id` as the current command for `key`.
    ///
    /// Inside the per-key critical section the new id replaces the previous
    /// one; the previous id is returned only when that instance has not yet
    /// reached a final runtime status. Callers receiving `Some(prev)` must
    /// not proceed past admission until `prev` finalizes or the wait ceiling
    /// elapses. No side effects happen beyond the slot swap.
    pub async fn admit(&self, key: &str, command_id: Uuid) -> Option<Uuid> {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut current = slot.lock().await;
        let previous = current.replace(command_id);

        match previous {
            Some(prev) if !self.statuses.is_final(prev) => {
                debug!(
                    key,
                    command_id = %command_id,
                    predecessor = %prev,
                    "Admitted command behind live predecessor"
                );
                Some(prev)
            }
            _ => {
                debug!(key, command_id = %command_id, "Admitted command with free slot");
                None
            }
        }
    }

    /// Current holder of the slot for `key`, if any command was admitted.
    pub async fn current(&self, key: &str) -> Option<Uuid> {
        let slot = self.slots.get(key).map(|s| Arc::clone(s.value()))?;
        let current = slot.lock().await;
        *current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommandRuntimeStatus;

    fn slots() -> (CommandSlots, Arc<InstanceStatusStore>) {
        let statuses = Arc::new(InstanceStatusStore::new());
        (CommandSlots::new(Arc::clone(&statuses)), statuses)
    }

    #[tokio::test]
    async fn first_admission_returns_no_predecessor() {
        let (slots, _) = slots();
        assert_eq!(slots.admit("project/p-1", Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn live_predecessor_is_returned() {
        let (slots, statuses) = slots();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        statuses.advance(first, CommandRuntimeStatus::Running);
        assert_eq!(slots.admit("project/p-1", first).await, None);
        assert_eq!(slots.admit("project/p-1", second).await, Some(first));
        assert_eq!(slots.current("project/p-1").await, Some(second));
    }

    #[tokio::test]
    async fn finalized_predecessor_is_not_returned() {
        let (slots, statuses) = slots();
        let first = Uuid::new_v4();

        statuses.advance(first, CommandRuntimeStatus::Completed);
        slots.admit("project/p-1", first).await;

        assert_eq!(slots.admit("project/p-1", Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let (slots, statuses) = slots();
        let running = Uuid::new_v4();
        statuses.advance(running, CommandRuntimeStatus::Running);

        slots.admit("project/p-1", running).await;
        assert_eq!(slots.admit("project/p-2", Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn concurrent_admissions_serialize_on_one_key() {
        let (slots, statuses) = slots();
        let slots = Arc::new(slots);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let slots = Arc::clone(&slots);
            let statuses = Arc::clone(&statuses);
            handles.push(tokio::spawn(async move {
                let id = Uuid::new_v4();
                statuses.advance(id, CommandRuntimeStatus::Running);
                (id, slots.admit("project/p-1", id).await)
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }

        // Exactly one admission found a free slot; every other one got a
        // live predecessor handed back.
        let free = admitted.iter().filter(|(_, prev)| prev.is_none()).count();
        assert_eq!(free, 1);

        // Each returned predecessor is one of the admitted command ids.
        let ids: Vec<Uuid> = admitted.iter().map(|(id, _)| *id).collect();
        for (_, prev) in &admitted {
            if let Some(prev) = prev {
                assert!(ids.contains(prev));
            }
        }
    }
}
