//! # Provider Dispatch
//!
//! Fan-out/fan-in delivery of commands to external providers.
//!
//! ## Delivery protocol
//!
//! A provider either answers the `POST` synchronously with a final result,
//! or acknowledges with an active result and later resolves the callback URL
//! (`{base}/{command_id}/{provider_id}`). The dispatcher then waits on the
//! delivery channel up to the external wait ceiling, makes one last-chance
//! fetch on expiry, and only then escalates a timeout error.
//!
//! Unregistered providers get an inline, blocking registration before their
//! first delivery — commands are never silently dropped for that reason.

pub mod transport;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditTrail, CommandAuditEntry};
use crate::config::OrchestratorConfig;
use crate::model::{
    Command, CommandError, CommandResult, CommandRuntimeStatus, Provider, ProviderCommandMessage,
};
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::runtime::{retry_step, SignalHub};

pub use transport::{HttpProviderTransport, ProviderTransport, TransportError};

/// Delivery channels: one per (command, provider) pair, resolved by the
/// provider's callback.
pub type DeliverySignals = SignalHub<(Uuid, String), CommandResult>;

/// Blocking registration hook used for unregistered-but-required providers.
/// Implemented by the provider registrar; wired after construction to break
/// the dispatcher/registrar cycle.
#[async_trait]
pub trait InlineRegistration: Send + Sync {
    async fn register_inline(&self, provider: &Provider) -> OrchestrationResult<Provider>;
}

/// Inbound callback surface handed to the request-handling layer: providers
/// `POST {callback_url}` with a final command result.
#[derive(Clone)]
pub struct ProviderCallbacks {
    deliveries: Arc<DeliverySignals>,
}

impl ProviderCallbacks {
    /// Resolve the delivery channel for one command/provider pair.
    ///
    /// Idempotent: repeat deliveries on an already-resolved channel return
    /// `false` and never alter the recorded result.
    pub fn deliver(&self, command_id: Uuid, provider_id: &str, result: CommandResult) -> bool {
        let delivered = self
            .deliveries
            .signal(&(command_id, provider_id.to_string()), result);
        if !delivered {
            info!(
                command_id = %command_id,
                provider_id,
                "Ignoring repeat callback for resolved delivery"
            );
        }
        delivered
    }
}

/// Fan-out/fan-in dispatcher for provider command delivery.
pub struct ProviderDispatcher {
    transport: Arc<dyn ProviderTransport>,
    deliveries: Arc<DeliverySignals>,
    audit: Arc<dyn AuditTrail>,
    config: Arc<OrchestratorConfig>,
    registration: OnceLock<Arc<dyn InlineRegistration>>,
}

impl ProviderDispatcher {
    pub fn new(
        transport: Arc<dyn ProviderTransport>,
        audit: Arc<dyn AuditTrail>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            transport,
            deliveries: Arc::new(DeliverySignals::new()),
            audit,
            config,
            registration: OnceLock::new(),
        }
    }

    /// Wire the registrar once the full system is constructed.
    pub fn set_inline_registration(&self, registration: Arc<dyn InlineRegistration>) {
        let _ = self.registration.set(registration);
    }

    /// Callback handle for the inbound request layer.
    pub fn callbacks(&self) -> ProviderCallbacks {
        ProviderCallbacks {
            deliveries: Arc::clone(&self.deliveries),
        }
    }

    /// Deliver one command to one provider and wait for its final result.
    ///
    /// Always returns a result; failures are recorded in `errors` rather
    /// than raised, so fan-out callers can aggregate per provider.
    pub async fn send_to_one(&self, command: &Command, provider: &Provider) -> CommandResult {
        let mut provider = provider.clone();

        // Inline, blocking registration for unregistered providers; the
        // register command itself is exempt.
        if !provider.is_registered() && !command.kind.is_provider_register() {
            if let Some(registration) = self.registration.get() {
                match registration.register_inline(&provider).await {
                    Ok(updated) => provider = updated,
                    Err(err) => {
                        warn!(
                            command_id = %command.command_id,
                            provider_id = %provider.id,
                            error = %err,
                            "Inline provider registration failed"
                        );
                        let mut result = CommandResult::running(command.command_id);
                        result.push_error(CommandError::provider(&provider.id, &err));
                        result.runtime_status = CommandRuntimeStatus::Failed;
                        self.audit_delivery(command, &provider, &result).await;
                        return result;
                    }
                }
            }
        }

        let message = ProviderCommandMessage {
            command: command.clone(),
            callback_url: self.config.callback_url(command.command_id, &provider.id),
        };

        let sent = retry_step("provider_send", self.config.step_retry(), || async {
            self.transport
                .send(&provider, &message)
                .await
                .map_err(|err| Self::transport_error(&provider, "provider_send", err))
        })
        .await;

        let mut result = match sent {
            Ok(result) => result,
            Err(err) => {
                let mut result = CommandResult::running(command.command_id);
                result.push_error(match err {
                    OrchestrationError::Provider { .. } => {
                        CommandError::provider(&provider.id, &err)
                    }
                    other => other.into(),
                });
                result.runtime_status = CommandRuntimeStatus::Failed;
                self.audit_delivery(command, &provider, &result).await;
                return result;
            }
        };

        if result.runtime_status.is_active() {
            result = self.await_callback(command, &provider, result).await;
        }

        self.audit_delivery(command, &provider, &result).await;
        result
    }

    /// Dispatch one command to many providers concurrently.
    ///
    /// With `fail_fast`, the first errored result stops the wait on the
    /// remaining providers and the partial map is returned immediately.
    /// Otherwise every provider's result — success or error — is collected.
    pub async fn send_to_many(
        &self,
        command: &Command,
        providers: &[Provider],
        fail_fast: bool,
    ) -> HashMap<String, CommandResult> {
        let mut deliveries: FuturesUnordered<_> = providers
            .iter()
            .map(|provider| async move {
                (
                    provider.id.clone(),
                    self.send_to_one(command, provider).await,
                )
            })
            .collect();

        let mut results = HashMap::new();
        while let Some((provider_id, result)) = deliveries.next().await {
            let errored = result.has_errors();
            results.insert(provider_id, result);
            if fail_fast && errored {
                // Remaining in-flight deliveries are dropped; their providers
                // resolve their callbacks into the void.
                break;
            }
        }
        results
    }

    /// Bounded wait for the provider's callback, with a last-chance fetch
    /// before escalating a timeout.
    async fn await_callback(
        &self,
        command: &Command,
        provider: &Provider,
        acknowledged: CommandResult,
    ) -> CommandResult {
        let ceiling = self.config.external_wait_ceiling();
        let key = (command.command_id, provider.id.clone());

        self.audit
            .append(
                CommandAuditEntry::progress(
                    command.command_id,
                    command.parent_command_id,
                    CommandRuntimeStatus::Running,
                    "Waiting for provider callback",
                )
                .for_provider(&provider.id),
            )
            .await;

        if let Some(result) = self.deliveries.wait(&key, ceiling).await {
            return result;
        }

        // The callback never came. Give the provider one last chance to
        // report a final result before escalating.
        let fetched = retry_step("provider_result_fetch", self.config.step_retry(), || async {
            self.transport
                .fetch_result(provider, command.command_id)
                .await
                .map_err(|err| Self::transport_error(provider, "provider_result_fetch", err))
        })
        .await;

        match fetched {
            Ok(result) if result.is_final() => result,
            _ => {
                let mut result = acknowledged;
                result.push_error(CommandError::timeout(
                    &format!("provider '{}'", provider.id),
                    ceiling,
                ));
                result.runtime_status = CommandRuntimeStatus::Failed;
                result
            }
        }
    }

    fn transport_error(
        provider: &Provider,
        step: &str,
        err: TransportError,
    ) -> OrchestrationError {
        if err.is_transient() {
            OrchestrationError::transient(step, err)
        } else {
            OrchestrationError::provider(&provider.id, err)
        }
    }

    async fn audit_delivery(&self, command: &Command, provider: &Provider, result: &CommandResult) {
        let message = if result.has_errors() {
            format!("Provider delivery failed: {}", result.errors[0])
        } else {
            "Provider delivery completed".to_string()
        };
        self.audit
            .append(
                CommandAuditEntry::progress(
                    command.command_id,
                    command.parent_command_id,
                    result.runtime_status,
                    message,
                )
                .for_provider(&provider.id),
            )
            .await;
    }
}
