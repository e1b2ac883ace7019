//! # Orchestration System Bootstrap
//!
//! Wires the orchestration core together: status store, serialization
//! slots, completion monitor, dispatcher, registrar, and engine. The inbound
//! request layer holds one of these, starts commands on it, and feeds
//! provider callbacks back in through [`ProviderCallbacks`].

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::config::OrchestratorConfig;
use crate::dispatch::{ProviderCallbacks, ProviderDispatcher, ProviderTransport};
use crate::model::{Command, CommandResult};
use crate::monitor::{CompletionMonitor, CompletionSignals};
use crate::orchestration::engine::{CommandEngine, OutcomeSignals};
use crate::orchestration::steps::Collaborators;
use crate::registration::ProviderRegistrar;
use crate::runtime::{InstanceStatusStore, SignalHub};
use crate::serialization::CommandSlots;

/// Fully wired orchestration core.
pub struct OrchestrationSystem {
    engine: CommandEngine,
    registrar: ProviderRegistrar,
    callbacks: ProviderCallbacks,
    statuses: Arc<InstanceStatusStore>,
    outcomes: Arc<OutcomeSignals>,
    config: Arc<OrchestratorConfig>,
}

impl OrchestrationSystem {
    pub fn new(
        collaborators: Collaborators,
        transport: Arc<dyn ProviderTransport>,
        audit: Arc<dyn AuditTrail>,
        config: OrchestratorConfig,
    ) -> Self {
        let config = Arc::new(config);
        let statuses = Arc::new(InstanceStatusStore::new());
        let slots = Arc::new(CommandSlots::new(Arc::clone(&statuses)));
        let completions = Arc::new(CompletionSignals::new());
        let monitor = CompletionMonitor::new(
            Arc::clone(&statuses),
            completions,
            Arc::clone(&config),
        );

        let dispatcher = Arc::new(ProviderDispatcher::new(
            transport,
            Arc::clone(&audit),
            Arc::clone(&config),
        ));
        let registrar = ProviderRegistrar::new(
            Arc::clone(&dispatcher),
            Arc::clone(&collaborators.providers),
            Arc::clone(&collaborators.users),
            Arc::clone(&audit),
            Arc::clone(&config),
        );
        dispatcher.set_inline_registration(Arc::new(registrar.clone()));

        let callbacks = dispatcher.callbacks();
        let outcomes: Arc<OutcomeSignals> = Arc::new(SignalHub::new());
        let engine = CommandEngine::new(
            statuses.clone(),
            slots,
            monitor,
            dispatcher,
            registrar.clone(),
            Arc::clone(&outcomes),
            collaborators,
            audit,
            Arc::clone(&config),
        );

        info!("Orchestration system initialized");
        Self {
            engine,
            registrar,
            callbacks,
            statuses,
            outcomes,
            config,
        }
    }

    pub fn engine(&self) -> &CommandEngine {
        &self.engine
    }

    pub fn registrar(&self) -> &ProviderRegistrar {
        &self.registrar
    }

    /// Callback handle for the inbound request layer.
    pub fn callbacks(&self) -> ProviderCallbacks {
        self.callbacks.clone()
    }

    pub fn statuses(&self) -> Arc<InstanceStatusStore> {
        Arc::clone(&self.statuses)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run a command inline and return its terminal result.
    pub async fn run_command(&self, command: Command) -> CommandResult {
        self.engine.run(command).await
    }

    /// Start a command as an independent orchestration instance.
    pub fn start_command(&self, command: Command) -> JoinHandle<CommandResult> {
        self.engine.spawn(command)
    }

    /// Bounded wait for a command's terminal result, for callers that
    /// started it detached.
    pub async fn await_result(&self, command_id: Uuid, ceiling: Duration) -> Option<CommandResult> {
        self.outcomes.wait(&command_id, ceiling).await
    }

    /// Start the hourly (configurable) provider registration fan-out.
    pub fn start_scheduled_registration(&self) -> JoinHandle<()> {
        self.registrar.run_scheduled()
    }
}
