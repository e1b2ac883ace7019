//! Runtime status tracking for orchestration instances.

use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

use crate::model::CommandRuntimeStatus;

/// Concurrent map of orchestration instance id to runtime status.
///
/// Statuses only move forward; an attempt to regress (or to leave a final
/// status) is ignored and logged. Instances the store has never seen report
/// `None`, which callers treat as "nothing to wait for".
#[derive(Debug, Default)]
pub struct InstanceStatusStore {
    statuses: DashMap<Uuid, CommandRuntimeStatus>,
}

impl InstanceStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance an instance to `status`, refusing backwards transitions.
    ///
    /// Returns the status actually in effect afterwards.
    pub fn advance(&self, instance_id: Uuid, status: CommandRuntimeStatus) -> CommandRuntimeStatus {
        let mut entry = self.statuses.entry(instance_id).or_insert(status);
        if status.rank() < entry.rank() || (entry.is_final() && *entry != status) {
            warn!(
                instance_id = %instance_id,
                current = %*entry,
                requested = %status,
                "Ignoring backwards runtime status transition"
            );
        } else {
            *entry = status;
        }
        *entry
    }

    pub fn status_of(&self, instance_id: Uuid) -> Option<CommandRuntimeStatus> {
        self.statuses.get(&instance_id).map(|s| *s)
    }

    /// Whether the instance has reached a final status. Unknown instances
    /// count as final: there is nothing left to wait for.
    pub fn is_final(&self, instance_id: Uuid) -> bool {
        self.status_of(instance_id).map_or(true, |s| s.is_final())
    }
}
