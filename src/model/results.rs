//! Command outcome envelopes: runtime status, structured errors, and the
//! result payload delivered to callers and parent orchestrations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle status of a command's orchestration instance.
///
/// Transitions only move forward: `Pending -> Running -> {Completed, Failed}`.
/// The instance status store enforces this; a final status never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandRuntimeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl CommandRuntimeStatus {
    /// Terminal statuses allow no further transitions.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// A command that has been accepted but not yet finished.
    pub fn is_active(&self) -> bool {
        !self.is_final()
    }

    /// Ordering rank used to reject backwards transitions.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed => 2,
        }
    }
}

impl fmt::Display for CommandRuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Classification of a recorded command error.
///
/// `Timeout` is deliberately distinct from `Provider`: "the dependency never
/// answered" and "the dependency answered with a failure" call for different
/// operator responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandErrorKind {
    Transient,
    Validation,
    Provider,
    Timeout,
    Internal,
}

/// A structured error appended to a command result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandError {
    pub kind: CommandErrorKind,
    pub message: String,
}

impl CommandError {
    pub fn new(kind: CommandErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn provider(provider_id: &str, message: impl fmt::Display) -> Self {
        Self::new(
            CommandErrorKind::Provider,
            format!("provider '{provider_id}': {message}"),
        )
    }

    pub fn timeout(operation: &str, ceiling: Duration) -> Self {
        Self::new(
            CommandErrorKind::Timeout,
            format!("{operation} gave no answer within {}s", ceiling.as_secs()),
        )
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// The in-progress or terminal outcome of executing a [`Command`].
///
/// [`Command`]: crate::model::Command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_id: Uuid,
    pub runtime_status: CommandRuntimeStatus,
    /// Kind-specific result payload, present on success.
    pub result: Option<serde_json::Value>,
    /// Ordered list of structured errors, oldest first.
    #[serde(default)]
    pub errors: Vec<CommandError>,
}

impl CommandResult {
    pub fn pending(command_id: Uuid) -> Self {
        Self {
            command_id,
            runtime_status: CommandRuntimeStatus::Pending,
            result: None,
            errors: Vec::new(),
        }
    }

    pub fn running(command_id: Uuid) -> Self {
        Self {
            runtime_status: CommandRuntimeStatus::Running,
            ..Self::pending(command_id)
        }
    }

    pub fn completed(command_id: Uuid, result: Option<serde_json::Value>) -> Self {
        Self {
            runtime_status: CommandRuntimeStatus::Completed,
            result,
            ..Self::pending(command_id)
        }
    }

    pub fn push_error(&mut self, error: CommandError) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_final(&self) -> bool {
        self.runtime_status.is_final()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_statuses_are_final() {
        assert!(!CommandRuntimeStatus::Pending.is_final());
        assert!(!CommandRuntimeStatus::Running.is_final());
        assert!(CommandRuntimeStatus::Completed.is_final());
        assert!(CommandRuntimeStatus::Failed.is_final());
    }

    #[test]
    fn status_rank_only_moves_forward() {
        assert!(CommandRuntimeStatus::Pending.rank() < CommandRuntimeStatus::Running.rank());
        assert!(CommandRuntimeStatus::Running.rank() < CommandRuntimeStatus::Failed.rank());
        assert_eq!(
            CommandRuntimeStatus::Completed.rank(),
            CommandRuntimeStatus::Failed.rank()
        );
    }

    #[test]
    fn errors_preserve_insertion_order() {
        let mut result = CommandResult::running(Uuid::new_v4());
        result.push_error(CommandError::new(CommandErrorKind::Transient, "first"));
        result.push_error(CommandError::timeout("provider wait", Duration::from_secs(5)));

        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].message, "first");
        assert_eq!(result.errors[1].kind, CommandErrorKind::Timeout);
    }
}
