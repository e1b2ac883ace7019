//! # Provider Registration Fan-out
//!
//! Scheduled or on-demand (re)registration of providers. Registration sends
//! a `ProviderRegister` command to one provider and, on success, merges the
//! reported principal and properties into the stored record and stamps the
//! registration time — inside a critical section over the provider
//! collection, so concurrent completions cannot lose updates.
//!
//! `register_all` fans out one registration per provider; per-provider
//! failures are recorded and never abort siblings.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audit::{AuditTrail, CommandAuditEntry};
use crate::config::OrchestratorConfig;
use crate::dispatch::{InlineRegistration, ProviderDispatcher};
use crate::model::{Command, CommandKind, CommandRuntimeStatus, Provider};
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::orchestration::steps::{ProviderRepository, RegistrationOutput, UserRepository};
use crate::runtime::retry_step;

/// Outcome of a registration fan-out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationSummary {
    pub registered: Vec<String>,
    /// provider id -> failure message
    pub failed: Vec<(String, String)>,
}

/// Registration driver for the provider collection.
#[derive(Clone)]
pub struct ProviderRegistrar {
    dispatcher: Arc<ProviderDispatcher>,
    providers: Arc<dyn ProviderRepository>,
    users: Arc<dyn UserRepository>,
    audit: Arc<dyn AuditTrail>,
    config: Arc<OrchestratorConfig>,
    /// Critical section over the whole provider collection; guards the
    /// read-merge-write after each registration completes.
    collection_lock: Arc<Mutex<()>>,
}

impl ProviderRegistrar {
    pub fn new(
        dispatcher: Arc<ProviderDispatcher>,
        providers: Arc<dyn ProviderRepository>,
        users: Arc<dyn UserRepository>,
        audit: Arc<dyn AuditTrail>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            dispatcher,
            providers,
            users,
            audit,
            config,
            collection_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Register one provider, blocking until its result is in, and merge the
    /// reported registration data into the stored record.
    pub async fn register_one(&self, provider: &Provider) -> OrchestrationResult<Provider> {
        let policy = self.config.step_retry();

        let users = &self.users;
        let system_user =
            retry_step("system_user", policy, || async { users.system_user().await }).await?;

        let command = Command::new(
            CommandKind::ProviderRegister {
                provider_id: Some(provider.id.clone()),
            },
            system_user,
        );

        let result = self.dispatcher.send_to_one(&command, provider).await;
        if result.has_errors() || result.runtime_status != CommandRuntimeStatus::Completed {
            let message = result
                .errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "provider returned no final result".to_string());
            self.audit
                .append(
                    CommandAuditEntry::progress(
                        command.command_id,
                        None,
                        CommandRuntimeStatus::Failed,
                        format!("Provider registration failed: {message}"),
                    )
                    .for_provider(&provider.id),
                )
                .await;
            return Err(OrchestrationError::provider(&provider.id, message));
        }

        let output: RegistrationOutput = match result.result {
            Some(value) => serde_json::from_value(value)?,
            None => RegistrationOutput::default(),
        };

        let updated = {
            let _guard = self.collection_lock.lock().await;

            let providers = &self.providers;
            let current = retry_step("get_provider", policy, || async {
                providers.get(&provider.id).await
            })
            .await?;

            match current {
                None => {
                    // Deleted while the registration was in flight.
                    warn!(
                        provider_id = %provider.id,
                        "Provider registration skipped - provider no longer exists"
                    );
                    return Ok(provider.clone());
                }
                Some(mut current) => {
                    current.principal_id = output.principal_id.or(current.principal_id);
                    current.properties.extend(output.properties);
                    current.registered = Some(Utc::now());
                    retry_step("set_provider", policy, || async {
                        providers.set(current.clone()).await
                    })
                    .await?
                }
            }
        };

        info!(provider_id = %updated.id, "Provider registration succeeded");
        self.audit
            .append(
                CommandAuditEntry::progress(
                    command.command_id,
                    None,
                    CommandRuntimeStatus::Completed,
                    "Provider registration succeeded",
                )
                .for_provider(&updated.id),
            )
            .await;
        Ok(updated)
    }

    /// Register every provider concurrently; sibling failures are recorded
    /// in the summary instead of aborting the fan-out.
    pub async fn register_all(&self) -> OrchestrationResult<RegistrationSummary> {
        let providers = &self.providers;
        let all = retry_step("list_providers", self.config.step_retry(), || async {
            providers.list().await
        })
        .await?;

        if all.is_empty() {
            return Ok(RegistrationSummary::default());
        }

        let runs = all.iter().map(|provider| async move {
            (provider.id.clone(), self.register_one(provider).await)
        });

        let mut summary = RegistrationSummary::default();
        for (provider_id, outcome) in join_all(runs).await {
            match outcome {
                Ok(_) => summary.registered.push(provider_id),
                Err(err) => {
                    warn!(provider_id = %provider_id, error = %err, "Provider registration failed");
                    summary.failed.push((provider_id, err.to_string()));
                }
            }
        }
        Ok(summary)
    }

    /// Fire-and-forget variant of [`register_all`](Self::register_all).
    pub fn register_all_detached(&self) -> JoinHandle<()> {
        let registrar = self.clone();
        tokio::spawn(async move {
            if let Err(err) = registrar.register_all().await {
                warn!(error = %err, "Detached provider registration failed");
            }
        })
    }

    /// Scheduled trigger: one registration fan-out immediately, then one per
    /// configured interval.
    pub fn run_scheduled(&self) -> JoinHandle<()> {
        let registrar = self.clone();
        let interval = self.config.registration_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = registrar.register_all().await {
                    warn!(error = %err, "Scheduled provider registration failed");
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl InlineRegistration for ProviderRegistrar {
    async fn register_inline(&self, provider: &Provider) -> OrchestrationResult<Provider> {
        info!(
            provider_id = %provider.id,
            "Registering provider inline before first dispatch"
        );
        self.register_one(provider).await
    }
}
