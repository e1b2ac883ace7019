//! # Command & Result Model
//!
//! Typed envelopes for administrative commands and their outcomes, plus the
//! domain records they carry (projects, users, providers).
//!
//! The command kind is a closed tagged union so the orchestration engine can
//! match exhaustively: adding a kind without a handler is a compile error,
//! not a runtime surprise.

pub mod commands;
pub mod data;
pub mod results;

pub use commands::{Command, CommandKind, MonitorNotification, ProviderCommandMessage};
pub use data::{Project, ProjectIdentity, Provider, ResourceGroup, User, UserRole};
pub use results::{CommandError, CommandErrorKind, CommandResult, CommandRuntimeStatus};
