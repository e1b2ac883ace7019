//! # Orchestration Error Types
//!
//! Structured error taxonomy for command orchestration using thiserror.
//!
//! The taxonomy drives retry behavior: only [`OrchestrationError::Transient`]
//! errors are retried at the step boundary, everything else surfaces
//! immediately. Every variant converts into a [`CommandError`] so no command
//! terminates without a recorded, classified error.

use std::time::Duration;
use thiserror::Error;

use crate::model::{CommandError, CommandErrorKind};

/// Errors raised by orchestration steps and components.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// Infrastructure hiccup worth retrying (network, store unavailable).
    #[error("transient failure in step '{step}': {message}")]
    Transient { step: String, message: String },

    /// Business validation failure; never retried.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// A provider answered with a business-level rejection.
    #[error("provider '{provider_id}' rejected command: {message}")]
    Provider {
        provider_id: String,
        message: String,
    },

    /// One or more providers failed during a fan-out; the individual errors
    /// were already collected per provider.
    #[error("{} provider error(s) during fan-out", errors.len())]
    ProvidersFailed { errors: Vec<CommandError> },

    /// A bounded wait elapsed without an answer.
    #[error("timeout: {operation} gave no answer within {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("internal orchestration error: {message}")]
    Internal { message: String },
}

impl OrchestrationError {
    pub fn transient(step: impl Into<String>, message: impl ToString) -> Self {
        Self::Transient {
            step: step.into(),
            message: message.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn provider(provider_id: impl Into<String>, message: impl ToString) -> Self {
        Self::Provider {
            provider_id: provider_id.into(),
            message: message.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    pub fn internal(message: impl ToString) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }

    /// Whether a retried step should attempt this error again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<serde_json::Error> for OrchestrationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<OrchestrationError> for CommandError {
    fn from(err: OrchestrationError) -> Self {
        let kind = match &err {
            OrchestrationError::Transient { .. } => CommandErrorKind::Transient,
            OrchestrationError::Validation { .. } => CommandErrorKind::Validation,
            OrchestrationError::Provider { .. } | OrchestrationError::ProvidersFailed { .. } => {
                CommandErrorKind::Provider
            }
            OrchestrationError::Timeout { .. } => CommandErrorKind::Timeout,
            OrchestrationError::Serialization { .. } | OrchestrationError::Internal { .. } => {
                CommandErrorKind::Internal
            }
        };
        CommandError::new(kind, err.to_string())
    }
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(OrchestrationError::transient("persist_project", "store offline").is_transient());
        assert!(!OrchestrationError::validation("name missing").is_transient());
        assert!(!OrchestrationError::provider("github", "no repo quota").is_transient());
        assert!(!OrchestrationError::timeout("provider wait", Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn timeout_converts_to_timeout_command_error() {
        let err: CommandError =
            OrchestrationError::timeout("predecessor wait", Duration::from_secs(30)).into();
        assert_eq!(err.kind, CommandErrorKind::Timeout);
    }
}
