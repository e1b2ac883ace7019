//! # Completion Monitor
//!
//! Lets orchestration A wait for orchestration B to finish even when B's
//! completion arrives through an external signal A cannot subscribe to.
//!
//! ## Protocol
//!
//! 1. A calls [`CompletionMonitor::start`] with its own instance id and B's
//!    id as correlation id.
//! 2. The start step checks B's status once. Already-final predecessors get
//!    A's channel signaled immediately — zero polling iterations. Otherwise
//!    an independent monitor task is spawned.
//! 3. The monitor polls B's status on a fixed interval through a durable
//!    timer (never a busy loop), each check delegated to a retried step.
//! 4. On a final status — or on ceiling expiry, favoring forward progress
//!    over a guaranteed-accurate view — the monitor signals A's channel with
//!    B's correlation id exactly once and terminates.
//! 5. A performs a bounded wait on its channel and proceeds regardless of
//!    the outcome.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::model::MonitorNotification;
use crate::orchestration::errors::OrchestrationResult;
use crate::runtime::{retry_step, InstanceStatusStore, SignalHub};

/// Outcome of a monitor start step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStart {
    /// The predecessor was already final; the waiter's channel is resolved.
    NotNeeded,
    /// An independent monitor task is polling the predecessor.
    Started,
}

/// Completion channels are keyed by waiter instance and watched correlation
/// id; the signal payload is the watched instance id.
pub type CompletionSignals = SignalHub<(Uuid, Uuid), Uuid>;

/// Polling bridge that wakes a waiter when a predecessor workflow finishes.
#[derive(Clone)]
pub struct CompletionMonitor {
    statuses: Arc<InstanceStatusStore>,
    completions: Arc<CompletionSignals>,
    config: Arc<OrchestratorConfig>,
}

impl CompletionMonitor {
    pub fn new(
        statuses: Arc<InstanceStatusStore>,
        completions: Arc<CompletionSignals>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            statuses,
            completions,
            config,
        }
    }

    /// Start monitoring the predecessor named in `notification`.
    ///
    /// Checks the predecessor's status once (retried step). If it is already
    /// final the waiter's channel is signaled immediately and nothing is
    /// spawned; otherwise an independent monitor task takes over.
    pub async fn start(
        &self,
        notification: MonitorNotification,
    ) -> OrchestrationResult<MonitorStart> {
        let statuses = Arc::clone(&self.statuses);
        let watched = notification.correlation_id;

        let already_final = retry_step(
            "monitor_status_probe",
            self.config.step_retry(),
            || async { Ok(statuses.is_final(watched)) },
        )
        .await?;

        if already_final {
            debug!(
                instance_id = %notification.instance_id,
                correlation_id = %watched,
                "Predecessor already final, no monitoring needed"
            );
            self.signal(&notification);
            return Ok(MonitorStart::NotNeeded);
        }

        info!(
            instance_id = %notification.instance_id,
            correlation_id = %watched,
            "Monitoring started for predecessor"
        );
        self.spawn_monitor(notification);
        Ok(MonitorStart::Started)
    }

    /// Bounded wait on the waiter's completion channel.
    ///
    /// Returns the watched instance id when signaled, `None` when the wait
    /// ceiling elapsed first. Callers proceed either way.
    pub async fn wait_for(&self, notification: &MonitorNotification) -> Option<Uuid> {
        let key = (notification.instance_id, notification.correlation_id);
        let outcome = self
            .completions
            .wait(&key, self.config.external_wait_ceiling())
            .await;
        if outcome.is_none() {
            warn!(
                instance_id = %notification.instance_id,
                correlation_id = %notification.correlation_id,
                "Predecessor wait ceiling elapsed, proceeding anyway"
            );
        }
        outcome
    }

    fn signal(&self, notification: &MonitorNotification) {
        let key = (notification.instance_id, notification.correlation_id);
        self.completions.signal(&key, notification.correlation_id);
    }

    /// The independent monitor workflow: durable timer, retried status
    /// check, single terminal signal.
    fn spawn_monitor(&self, notification: MonitorNotification) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let deadline = Instant::now() + monitor.config.external_wait_ceiling();
            let poll_interval = monitor.config.monitor_poll_interval();
            let watched = notification.correlation_id;

            loop {
                tokio::time::sleep(poll_interval).await;

                let statuses = Arc::clone(&monitor.statuses);
                let finished = retry_step(
                    "monitor_status_probe",
                    monitor.config.step_retry(),
                    || async { Ok(statuses.is_final(watched)) },
                )
                .await
                .unwrap_or(true);

                if finished {
                    debug!(correlation_id = %watched, "Monitored instance finalized");
                    monitor.signal(&notification);
                    return;
                }

                if Instant::now() >= deadline {
                    warn!(
                        correlation_id = %watched,
                        "Monitor ceiling elapsed before instance finalized, signaling anyway"
                    );
                    monitor.signal(&notification);
                    return;
                }
            }
        })
    }
}
