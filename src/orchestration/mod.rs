//! # Command Orchestrations
//!
//! One state machine per command kind on a shared engine skeleton:
//!
//! 1. Register the instance as Running and open the command result.
//! 2. Admit the command through the per-resource serialization slot; wait on
//!    a live predecessor through the completion monitor.
//! 3. Execute domain steps as retried operations.
//! 4. Fan out to providers where the kind requires external participation.
//! 5. Record the terminal result — success or failure — unconditionally, and
//!    start compensation for failed creation commands.
//!
//! The per-kind handlers live in [`handlers`]; external collaborators are
//! the traits in [`steps`].

pub mod engine;
pub mod errors;
pub mod handlers;
pub mod steps;
pub mod system;

pub use engine::CommandEngine;
pub use errors::{OrchestrationError, OrchestrationResult};
pub use steps::{
    CloudResources, Collaborators, DeploymentOutput, ProjectRepository, ProviderRepository,
    RegistrationOutput, UserRepository,
};
pub use system::OrchestrationSystem;
