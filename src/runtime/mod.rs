//! # Execution Substrate
//!
//! The behavioral contract the orchestration core needs from its durable
//! execution substrate, implemented in-process on tokio:
//!
//! - [`status::InstanceStatusStore`] — forward-only runtime status per
//!   orchestration instance, the basis for admission and monitoring checks.
//! - [`signals::SignalHub`] — keyed one-shot signal channels for external
//!   events (predecessor completions, provider callbacks). Resolution is
//!   idempotent: repeat signals never alter the recorded value.
//! - [`retry::retry_step`] — step execution with transient-only retry.
//!
//! Orchestration bodies suspend only at these seams (retried steps, durable
//! timers, signal waits, sub-workflow results); between suspension points
//! they run to completion.

pub mod retry;
pub mod signals;
pub mod status;

pub use retry::{retry_step, RetryPolicy};
pub use signals::SignalHub;
pub use status::InstanceStatusStore;
