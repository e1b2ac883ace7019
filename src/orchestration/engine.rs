//! # Command Engine
//!
//! The shared orchestration skeleton every command kind runs on.
//!
//! The engine owns the lifecycle plumbing — admission, predecessor waits,
//! status transitions, error capture, terminal result delivery, and
//! compensation — while the per-kind handlers own the domain steps. Every
//! run ends with a recorded terminal result: success and failure paths both
//! flow through the same tail.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditTrail, CommandAuditEntry};
use crate::config::OrchestratorConfig;
use crate::dispatch::ProviderDispatcher;
use crate::model::{
    Command, CommandError, CommandKind, CommandResult, CommandRuntimeStatus, MonitorNotification,
    Provider,
};
use crate::monitor::CompletionMonitor;
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::orchestration::handlers;
use crate::orchestration::steps::Collaborators;
use crate::registration::ProviderRegistrar;
use crate::runtime::{retry_step, InstanceStatusStore, SignalHub};
use crate::serialization::CommandSlots;

/// Terminal results, keyed by command id, for callers and parent
/// orchestrations that await a command they did not run inline.
pub type OutcomeSignals = SignalHub<Uuid, CommandResult>;

/// Orchestration engine: one [`run`](Self::run) per command instance.
///
/// Cheap to clone; all state is shared behind `Arc`s, which is what lets a
/// failed creation spawn its compensation run fire-and-forget.
#[derive(Clone)]
pub struct CommandEngine {
    pub(crate) statuses: Arc<InstanceStatusStore>,
    pub(crate) slots: Arc<CommandSlots>,
    pub(crate) monitor: CompletionMonitor,
    pub(crate) dispatcher: Arc<ProviderDispatcher>,
    pub(crate) registrar: ProviderRegistrar,
    pub(crate) outcomes: Arc<OutcomeSignals>,
    pub(crate) steps: Collaborators,
    pub(crate) audit: Arc<dyn AuditTrail>,
    pub(crate) config: Arc<OrchestratorConfig>,
}

impl CommandEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        statuses: Arc<InstanceStatusStore>,
        slots: Arc<CommandSlots>,
        monitor: CompletionMonitor,
        dispatcher: Arc<ProviderDispatcher>,
        registrar: ProviderRegistrar,
        outcomes: Arc<OutcomeSignals>,
        steps: Collaborators,
        audit: Arc<dyn AuditTrail>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            statuses,
            slots,
            monitor,
            dispatcher,
            registrar,
            outcomes,
            steps,
            audit,
            config,
        }
    }

    /// Run one command to its terminal result.
    ///
    /// Never returns a non-final result: any failure inside the body is
    /// captured into `errors` with status `Failed`, and creation failures
    /// additionally start compensation after the body has fully unwound.
    pub async fn run(&self, command: Command) -> CommandResult {
        let command_id = command.command_id;
        info!(
            command_id = %command_id,
            kind = command.kind.name(),
            parent = ?command.parent_command_id,
            "Command orchestration started"
        );

        self.statuses.advance(command_id, CommandRuntimeStatus::Running);
        let mut result = CommandResult::running(command_id);
        self.progress(&command, CommandRuntimeStatus::Running, "Command started")
            .await;

        match self.execute(&command).await {
            Ok(payload) => {
                result.result = payload;
                result.runtime_status = CommandRuntimeStatus::Completed;
            }
            Err(OrchestrationError::ProvidersFailed { errors }) => {
                result.errors.extend(errors);
                result.runtime_status = CommandRuntimeStatus::Failed;
            }
            Err(err) => {
                result.push_error(CommandError::from(err));
                result.runtime_status = CommandRuntimeStatus::Failed;
            }
        }

        // Terminal status first: a compensation run admitted on the same
        // resource key must see this instance as final.
        self.statuses.advance(command_id, result.runtime_status);

        let terminal_message = if result.has_errors() {
            error!(
                command_id = %command_id,
                kind = command.kind.name(),
                errors = result.errors.len(),
                "Command failed"
            );
            format!("Command failed: {}", result.errors[0])
        } else {
            info!(command_id = %command_id, kind = command.kind.name(), "Command succeeded");
            "Command succeeded".to_string()
        };
        self.progress(&command, result.runtime_status, terminal_message)
            .await;

        if result.runtime_status == CommandRuntimeStatus::Failed && command.kind.is_create() {
            self.start_rollback(&command).await;
        }

        self.outcomes.signal(&command_id, result.clone());
        result
    }

    /// Spawn a command as an independent orchestration instance.
    pub fn spawn(&self, command: Command) -> tokio::task::JoinHandle<CommandResult> {
        let engine = self.clone();
        tokio::spawn(async move { engine.run(command).await })
    }

    /// The orchestration body: admission, predecessor wait, per-kind steps.
    async fn execute(&self, command: &Command) -> OrchestrationResult<Option<serde_json::Value>> {
        if let Some(key) = command.resource_key() {
            if let Some(predecessor) = self.slots.admit(&key, command.command_id).await {
                let notification = MonitorNotification {
                    instance_id: command.command_id,
                    correlation_id: predecessor,
                };
                self.monitor.start(notification).await?;
                self.progress(
                    command,
                    CommandRuntimeStatus::Running,
                    format!("Waiting for command {predecessor}"),
                )
                .await;
                self.monitor.wait_for(&notification).await;
                self.progress(command, CommandRuntimeStatus::Running, "Resuming")
                    .await;
            }
        }

        match &command.kind {
            CommandKind::ProjectCreate(project) => {
                handlers::project::create(self, command, project).await
            }
            CommandKind::ProjectUpdate(project) => {
                handlers::project::update(self, command, project).await
            }
            CommandKind::ProjectDelete(project) => {
                handlers::project::delete(self, command, project).await
            }
            CommandKind::ProjectUserCreate { project_id, user }
            | CommandKind::ProjectUserUpdate { project_id, user } => {
                handlers::membership::set(self, command, project_id, user).await
            }
            CommandKind::ProjectUserDelete { project_id, user } => {
                handlers::membership::remove(self, command, project_id, user).await
            }
            CommandKind::ProviderCreate(provider) => {
                handlers::provider::create(self, command, provider).await
            }
            CommandKind::ProviderUpdate(provider) => {
                handlers::provider::update(self, command, provider).await
            }
            CommandKind::ProviderDelete(provider) => {
                handlers::provider::delete(self, command, provider).await
            }
            CommandKind::ProviderRegister { provider_id } => {
                handlers::provider::register(self, provider_id.as_deref()).await
            }
            CommandKind::OrgUserCreate(user) | CommandKind::OrgUserUpdate(user) => {
                handlers::org_user::set(self, command, user).await
            }
            CommandKind::OrgUserDelete(user) => {
                handlers::org_user::remove(self, command, user).await
            }
        }
    }

    /// Start the compensating delete as an independent, fire-and-forget run
    /// attributed to the system identity. The failing create's caller never
    /// waits on it.
    async fn start_rollback(&self, command: &Command) {
        let Some(delete_kind) = command.kind.compensating_delete() else {
            return;
        };

        let users = &self.steps.users;
        let system_user = match retry_step("system_user", self.config.step_retry(), || async {
            users.system_user().await
        })
        .await
        {
            Ok(user) => user,
            Err(err) => {
                error!(
                    command_id = %command.command_id,
                    error = %err,
                    "Compensation could not start: system user unavailable"
                );
                return;
            }
        };

        let delete = Command::spawned_by(delete_kind, system_user, command.command_id);
        warn!(
            command_id = %command.command_id,
            compensation_id = %delete.command_id,
            kind = delete.kind.name(),
            "Rolling back failed creation"
        );
        self.progress(
            command,
            CommandRuntimeStatus::Failed,
            format!("Compensating with {} {}", delete.kind.name(), delete.command_id),
        )
        .await;

        self.spawn(delete);
    }

    /// List all providers through a retried step.
    pub(crate) async fn list_providers(&self) -> OrchestrationResult<Vec<Provider>> {
        let providers = &self.steps.providers;
        retry_step("list_providers", self.config.step_retry(), || async {
            providers.list().await
        })
        .await
    }

    /// Fan a command out to every provider and hand back the per-provider
    /// results.
    pub(crate) async fn notify_providers(
        &self,
        command: &Command,
        fail_fast: bool,
    ) -> OrchestrationResult<HashMap<String, CommandResult>> {
        let providers = self.list_providers().await?;
        if providers.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .dispatcher
            .send_to_many(command, &providers, fail_fast)
            .await)
    }

    /// Collapse a fan-out result map into an error carrying every provider
    /// error, so the terminal command result lists them all.
    pub(crate) fn aggregate_provider_errors(
        results: &HashMap<String, CommandResult>,
    ) -> OrchestrationResult<()> {
        let errors: Vec<CommandError> = results
            .values()
            .flat_map(|result| result.errors.iter().cloned())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(OrchestrationError::ProvidersFailed { errors })
        }
    }

    /// Append a progress annotation to the audit trail. Informational only,
    /// never control flow.
    pub(crate) async fn progress(
        &self,
        command: &Command,
        status: CommandRuntimeStatus,
        message: impl Into<String>,
    ) {
        self.audit
            .append(CommandAuditEntry::progress(
                command.command_id,
                command.parent_command_id,
                status,
                message,
            ))
            .await;
    }
}
