//! # Command Audit Trail
//!
//! Every terminal result and intermediate progress annotation is appended to
//! a log keyed by command id, preserving parent/child command linkage.
//! Appends are best-effort: a broken audit sink never fails a command.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::model::CommandRuntimeStatus;

/// One audit record: a progress annotation or a terminal result snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandAuditEntry {
    pub command_id: Uuid,
    pub parent_command_id: Option<Uuid>,
    /// Set for per-provider dispatch records.
    pub provider_id: Option<String>,
    pub status: CommandRuntimeStatus,
    /// Free-text progress annotation; informational only, never control flow.
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl CommandAuditEntry {
    pub fn progress(
        command_id: Uuid,
        parent_command_id: Option<Uuid>,
        status: CommandRuntimeStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            command_id,
            parent_command_id,
            provider_id: None,
            status,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn for_provider(mut self, provider_id: &str) -> Self {
        self.provider_id = Some(provider_id.to_string());
        self
    }
}

/// Sink for audit records. Implementations must tolerate concurrent appends;
/// failures are swallowed and logged inside the implementation.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn append(&self, entry: CommandAuditEntry);

    /// All entries recorded for one command, oldest first.
    async fn entries_for(&self, command_id: Uuid) -> Vec<CommandAuditEntry>;
}

/// Audit sink that only emits tracing events. Useful until a real sink is
/// wired, and as the default in examples.
#[derive(Debug, Default)]
pub struct TracingAuditTrail;

#[async_trait]
impl AuditTrail for TracingAuditTrail {
    async fn append(&self, entry: CommandAuditEntry) {
        debug!(
            command_id = %entry.command_id,
            parent_command_id = ?entry.parent_command_id,
            provider_id = ?entry.provider_id,
            status = %entry.status,
            "{}",
            entry.message
        );
    }

    async fn entries_for(&self, _command_id: Uuid) -> Vec<CommandAuditEntry> {
        Vec::new()
    }
}
