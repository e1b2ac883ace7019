//! Per-kind command handlers.
//!
//! Each handler owns the domain steps for one command family and returns the
//! result payload on success; lifecycle plumbing (admission, waits, error
//! capture, compensation) stays in the engine.

pub mod membership;
pub mod org_user;
pub mod project;
pub mod provider;
