//! # Orchestrator Configuration
//!
//! Timeouts, retry policy, and scheduling knobs for the orchestration core.
//!
//! Defaults match the deployed behavior (3 step attempts, 5s monitor polls,
//! 30 minute external wait ceiling, hourly provider registration); every
//! value can be overridden through `TENANCY__`-prefixed environment
//! variables, e.g. `TENANCY__EXTERNAL_WAIT_CEILING_MS=60000`.

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::runtime::RetryPolicy;

/// Configuration for the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Attempts per retried step (transient failures only).
    pub step_retry_attempts: u32,
    /// Fixed delay between step attempts.
    pub step_retry_delay_ms: u64,
    /// Poll interval of the completion monitor.
    pub monitor_poll_interval_ms: u64,
    /// Ceiling for every external wait: predecessor completion, provider
    /// callback resolution, and the monitor's own lifetime.
    pub external_wait_ceiling_ms: u64,
    /// Interval of the scheduled provider registration fan-out.
    pub registration_interval_secs: u64,
    /// Base URL providers post command results back to.
    pub callback_base_url: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            step_retry_attempts: 3,
            step_retry_delay_ms: 500,
            monitor_poll_interval_ms: 5_000,
            external_wait_ceiling_ms: 30 * 60 * 1_000,
            registration_interval_secs: 60 * 60,
            callback_base_url: "http://localhost:8080/api/callbacks".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from the environment on top of defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let overrides = Config::builder()
            .add_source(Environment::with_prefix("TENANCY").separator("__"))
            .build()?;
        let mut config = OrchestratorConfig::default();
        if let Ok(v) = overrides.get::<u32>("step_retry_attempts") {
            config.step_retry_attempts = v;
        }
        if let Ok(v) = overrides.get::<u64>("step_retry_delay_ms") {
            config.step_retry_delay_ms = v;
        }
        if let Ok(v) = overrides.get::<u64>("monitor_poll_interval_ms") {
            config.monitor_poll_interval_ms = v;
        }
        if let Ok(v) = overrides.get::<u64>("external_wait_ceiling_ms") {
            config.external_wait_ceiling_ms = v;
        }
        if let Ok(v) = overrides.get::<u64>("registration_interval_secs") {
            config.registration_interval_secs = v;
        }
        if let Ok(v) = overrides.get::<String>("callback_base_url") {
            config.callback_base_url = v;
        }
        Ok(config)
    }

    pub fn step_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.step_retry_attempts,
            Duration::from_millis(self.step_retry_delay_ms),
        )
    }

    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_interval_ms)
    }

    pub fn external_wait_ceiling(&self) -> Duration {
        Duration::from_millis(self.external_wait_ceiling_ms)
    }

    pub fn registration_interval(&self) -> Duration {
        Duration::from_secs(self.registration_interval_secs)
    }

    /// Callback URL a provider resolves for one command delivery.
    pub fn callback_url(&self, command_id: uuid::Uuid, provider_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.callback_base_url.trim_end_matches('/'),
            command_id,
            provider_id
        )
    }
}
