//! Provider lifecycle orchestrations.
//!
//! These key their critical section on the provider's own record rather than
//! a project, and create/update trigger a registration round after the
//! mutation so the provider's principal and properties stay current.

use tracing::info;

use crate::model::{Command, CommandRuntimeStatus, Provider};
use crate::orchestration::engine::CommandEngine;
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::runtime::retry_step;

pub(crate) async fn create(
    engine: &CommandEngine,
    command: &Command,
    payload: &Provider,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();

    if retry_step("get_provider", policy, || async {
        steps.providers.get(&payload.id).await
    })
    .await?
    .is_some()
    {
        return Err(OrchestrationError::validation(format!(
            "provider '{}' already exists",
            payload.id
        )));
    }

    engine
        .progress(command, CommandRuntimeStatus::Running, "Creating provider")
        .await;
    let provider = retry_step("persist_provider", policy, || async {
        steps.providers.set(payload.clone()).await
    })
    .await?;

    // Registration failure fails the create; the engine then compensates by
    // deleting the record again.
    engine
        .progress(command, CommandRuntimeStatus::Running, "Registering provider")
        .await;
    let provider = engine.registrar.register_one(&provider).await?;

    info!(provider_id = %provider.id, "Provider created and registered");
    Ok(Some(serde_json::to_value(&provider)?))
}

pub(crate) async fn update(
    engine: &CommandEngine,
    command: &Command,
    payload: &Provider,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();

    retry_step("get_provider", policy, || async {
        steps.providers.get(&payload.id).await
    })
    .await?
    .ok_or_else(|| {
        OrchestrationError::validation(format!("unknown provider '{}'", payload.id))
    })?;

    engine
        .progress(command, CommandRuntimeStatus::Running, "Updating provider")
        .await;
    let provider = retry_step("persist_provider", policy, || async {
        steps.providers.set(payload.clone()).await
    })
    .await?;

    engine
        .progress(command, CommandRuntimeStatus::Running, "Registering provider")
        .await;
    let provider = engine.registrar.register_one(&provider).await?;

    Ok(Some(serde_json::to_value(&provider)?))
}

pub(crate) async fn delete(
    engine: &CommandEngine,
    command: &Command,
    payload: &Provider,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();

    engine
        .progress(command, CommandRuntimeStatus::Running, "Deleting provider")
        .await;
    retry_step("delete_provider", policy, || async {
        steps.providers.delete(&payload.id).await
    })
    .await?;

    info!(provider_id = %payload.id, "Provider deleted");
    Ok(None)
}

/// Explicit `ProviderRegister` command: one provider when named, the whole
/// collection otherwise.
pub(crate) async fn register(
    engine: &CommandEngine,
    provider_id: Option<&str>,
) -> OrchestrationResult<Option<serde_json::Value>> {
    match provider_id {
        Some(provider_id) => {
            let steps = &engine.steps;
            let provider = retry_step("get_provider", engine.config.step_retry(), || async {
                steps.providers.get(provider_id).await
            })
            .await?
            .ok_or_else(|| {
                OrchestrationError::validation(format!("unknown provider '{provider_id}'"))
            })?;
            let provider = engine.registrar.register_one(&provider).await?;
            Ok(Some(serde_json::to_value(&provider)?))
        }
        None => {
            let summary = engine.registrar.register_all().await?;
            Ok(Some(serde_json::to_value(&summary)?))
        }
    }
}
