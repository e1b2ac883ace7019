//! Retried step execution.
//!
//! Every domain side effect runs through [`retry_step`]: the step is treated
//! as an atomic black box, retried as a whole on transient failures only.
//! Business validation errors and provider rejections surface immediately.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};

/// Retry policy for a single step: fixed attempts, fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Single attempt, no retries. Used for steps that are retried at a
    /// higher level or must not repeat.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Run `op` up to `policy.max_attempts` times, retrying transient errors.
///
/// The final error (transient exhaustion or the first non-transient failure)
/// is returned to the orchestration, which records it on the command result.
pub async fn retry_step<T, F, Fut>(
    step: &str,
    policy: RetryPolicy,
    mut op: F,
) -> OrchestrationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OrchestrationResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(step, attempt, "Step succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    step,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "Transient step failure, retrying"
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => {
                warn!(step, attempt, error = %err, "Step failed");
                return Err(err);
            }
        }
    }
}
