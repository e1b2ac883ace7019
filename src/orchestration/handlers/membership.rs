//! Project membership orchestrations.
//!
//! Keyed on the owning project (the engine already admitted us under
//! `project/{id}`), then mirrored out to the providers so they can adjust
//! access on their side.

use crate::model::{Command, CommandRuntimeStatus, User, UserRole};
use crate::orchestration::engine::CommandEngine;
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::runtime::retry_step;

pub(crate) async fn set(
    engine: &CommandEngine,
    command: &Command,
    project_id: &str,
    user: &User,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();

    // The project must exist; membership commands never create it.
    retry_step("get_project", policy, || async {
        steps.projects.get(project_id).await
    })
    .await?
    .ok_or_else(|| OrchestrationError::validation(format!("unknown project '{project_id}'")))?;

    let role = user
        .project_memberships
        .get(project_id)
        .copied()
        .unwrap_or(UserRole::Member);

    engine
        .progress(command, CommandRuntimeStatus::Running, "Updating project membership")
        .await;
    let user = retry_step("set_membership", policy, || async {
        steps
            .users
            .set_membership(user.clone(), project_id, role)
            .await
    })
    .await?;

    let results = engine.notify_providers(command, false).await?;
    CommandEngine::aggregate_provider_errors(&results)?;

    Ok(Some(serde_json::to_value(&user)?))
}

pub(crate) async fn remove(
    engine: &CommandEngine,
    command: &Command,
    project_id: &str,
    user: &User,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();

    engine
        .progress(command, CommandRuntimeStatus::Running, "Removing project membership")
        .await;
    retry_step("remove_membership", policy, || async {
        steps.users.remove_membership(user.id, project_id).await
    })
    .await?;

    let results = engine.notify_providers(command, false).await?;
    CommandEngine::aggregate_provider_errors(&results)?;

    Ok(None)
}
