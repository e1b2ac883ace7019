#![allow(clippy::doc_markdown)] // Allow technical terms like DashMap, OAuth in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tenancy Core
//!
//! Command orchestration core for a multi-tenant cloud control plane.
//!
//! ## Overview
//!
//! The control plane mutates tenancy resources (projects, users, providers)
//! exclusively through **commands**. Each command runs as an orchestration
//! instance: it is admitted through a per-resource critical section so only
//! one command mutates a resource at a time, executes its kind-specific
//! steps with bounded retries, fans the change out to the registered
//! providers, and finishes with a terminal [`CommandResult`].
//!
//! ## Architecture
//!
//! - Per-resource **serialization slots** admit one active command per
//!   resource key; successors wait on a completion monitor that polls the
//!   predecessor's instance status.
//! - The **provider dispatcher** delivers command messages over a pluggable
//!   transport, waits on webhook callbacks with a hard ceiling, and makes a
//!   last-chance result fetch before declaring a timeout.
//! - Failed creation commands spawn a **compensating delete** attributed to
//!   the system identity, fire-and-forget.
//!
//! ## Module Organization
//!
//! - [`model`] - Commands, results, and the tenancy domain records
//! - [`runtime`] - Instance status store, signal channels, step retry
//! - [`serialization`] - Per-resource command admission
//! - [`monitor`] - Predecessor completion monitoring
//! - [`dispatch`] - Provider transport, fan-out, and callback handling
//! - [`orchestration`] - The command engine and per-kind handlers
//! - [`registration`] - Provider registration fan-out and scheduling
//! - [`audit`] - Command audit trail
//! - [`config`] - Environment-driven orchestrator configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenancy_core::audit::TracingAuditTrail;
//! use tenancy_core::config::OrchestratorConfig;
//! use tenancy_core::dispatch::HttpProviderTransport;
//! use tenancy_core::model::{Command, CommandKind, Project, User, UserRole};
//! use tenancy_core::orchestration::OrchestrationSystem;
//! use tenancy_core::orchestration::steps::Collaborators;
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let system = OrchestrationSystem::new(
//!     collaborators,
//!     Arc::new(HttpProviderTransport::new()),
//!     Arc::new(TracingAuditTrail),
//!     OrchestratorConfig::load()?,
//! );
//!
//! let admin = User::new(UserRole::Admin);
//! let command = Command::new(CommandKind::ProjectCreate(Project::new("demo")), admin);
//! let result = system.run_command(command).await;
//! println!("project create finished: {}", result.runtime_status);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod model;
pub mod monitor;
pub mod orchestration;
pub mod registration;
pub mod runtime;
pub mod serialization;
pub mod test_utils;

pub use config::OrchestratorConfig;
pub use model::{
    Command, CommandError, CommandErrorKind, CommandKind, CommandResult, CommandRuntimeStatus,
    Project, Provider, User, UserRole,
};
pub use orchestration::errors::{OrchestrationError, OrchestrationResult};
pub use orchestration::OrchestrationSystem;
