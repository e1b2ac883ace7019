//! Organization-level user orchestrations, keyed on the shared `org/users`
//! collection so concurrent user mutations cannot race each other.

use crate::model::{Command, CommandRuntimeStatus, User};
use crate::orchestration::engine::CommandEngine;
use crate::orchestration::errors::OrchestrationResult;
use crate::runtime::retry_step;

pub(crate) async fn set(
    engine: &CommandEngine,
    command: &Command,
    user: &User,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();

    engine
        .progress(command, CommandRuntimeStatus::Running, "Persisting user")
        .await;
    let user = retry_step("persist_user", policy, || async {
        steps.users.set(user.clone()).await
    })
    .await?;

    let results = engine.notify_providers(command, false).await?;
    CommandEngine::aggregate_provider_errors(&results)?;

    Ok(Some(serde_json::to_value(&user)?))
}

pub(crate) async fn remove(
    engine: &CommandEngine,
    command: &Command,
    user: &User,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();

    engine
        .progress(command, CommandRuntimeStatus::Running, "Deleting user")
        .await;
    retry_step("delete_user", policy, || async {
        steps.users.delete(user.id).await
    })
    .await?;

    let results = engine.notify_providers(command, false).await?;
    CommandEngine::aggregate_provider_errors(&results)?;

    Ok(None)
}
