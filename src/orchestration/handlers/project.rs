//! Project lifecycle orchestrations.
//!
//! Creation is the long one: persist, provision cloud resources, attach the
//! managed identity, tag, then fan the create out to every provider and
//! aggregate their errors. Deletion is written to tolerate partially
//! provisioned projects so it doubles as the compensation path.

use tracing::info;
use uuid::Uuid;

use crate::model::{Command, CommandRuntimeStatus, Project, ResourceGroup, UserRole};
use crate::orchestration::engine::CommandEngine;
use crate::orchestration::errors::OrchestrationResult;
use crate::runtime::retry_step;

pub(crate) async fn create(
    engine: &CommandEngine,
    command: &Command,
    payload: &Project,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();
    let mut project = payload.clone();

    // Organization defaults win over whatever the request carried.
    let default_tags = retry_step("default_tags", policy, || async {
        steps.projects.default_tags().await
    })
    .await?;
    project.tags.extend(default_tags);

    // Providers with a service principal become members of every project
    // they participate in.
    let providers = engine.list_providers().await?;
    for provider in &providers {
        let Some(principal_id) = provider.principal_id else {
            continue;
        };
        let provider_user = retry_step("get_provider_user", policy, || async {
            steps.users.get(principal_id).await
        })
        .await?;
        if let Some(mut user) = provider_user {
            user.ensure_project_membership(&project.id, UserRole::Provider);
            let user = retry_step("set_provider_user", policy, || async {
                steps.users.set(user.clone()).await
            })
            .await?;
            project.users.push(user);
        }
    }

    engine
        .progress(command, CommandRuntimeStatus::Running, "Creating project")
        .await;
    project = retry_step("persist_project", policy, || async {
        steps.projects.create(project.clone()).await
    })
    .await?;

    engine
        .progress(command, CommandRuntimeStatus::Running, "Allocating subscription")
        .await;
    let subscription_id: Uuid = retry_step("select_subscription", policy, || async {
        steps.cloud.select_subscription(&project).await
    })
    .await?;

    engine
        .progress(command, CommandRuntimeStatus::Running, "Provisioning resources")
        .await;
    let deployment = retry_step("create_resources", policy, || async {
        steps.cloud.create_resources(&project, subscription_id).await
    })
    .await?;

    engine
        .progress(command, CommandRuntimeStatus::Running, "Provisioning identity")
        .await;
    let identity = retry_step("create_identity", policy, || async {
        steps.cloud.create_identity(&project).await
    })
    .await?;

    project.resource_group = Some(ResourceGroup {
        subscription_id,
        region: deployment.region.clone(),
        id: deployment.resource_group_id.clone(),
        name: deployment.resource_group_name.clone(),
    });
    project.identity = Some(identity);
    project = retry_step("update_project", policy, || async {
        steps.projects.set(project.clone()).await
    })
    .await?;

    engine
        .progress(command, CommandRuntimeStatus::Running, "Tagging resources")
        .await;
    retry_step("tag_resources", policy, || async {
        steps.cloud.tag_resources(&project).await
    })
    .await?;

    engine
        .progress(command, CommandRuntimeStatus::Running, "Sending provider commands")
        .await;
    let results = engine
        .dispatcher
        .send_to_many(command, &providers, false)
        .await;
    CommandEngine::aggregate_provider_errors(&results)?;

    info!(project_id = %project.id, "Project created");
    Ok(Some(serde_json::to_value(&project)?))
}

pub(crate) async fn update(
    engine: &CommandEngine,
    command: &Command,
    payload: &Project,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();

    engine
        .progress(command, CommandRuntimeStatus::Running, "Updating project")
        .await;
    let project = retry_step("update_project", policy, || async {
        steps.projects.set(payload.clone()).await
    })
    .await?;

    let results = engine.notify_providers(command, false).await?;
    CommandEngine::aggregate_provider_errors(&results)?;

    Ok(Some(serde_json::to_value(&project)?))
}

/// Delete doubles as the compensation path, so every step tolerates a
/// partially provisioned project: missing cloud resources and a missing
/// record count as already deleted.
pub(crate) async fn delete(
    engine: &CommandEngine,
    command: &Command,
    payload: &Project,
) -> OrchestrationResult<Option<serde_json::Value>> {
    let steps = &engine.steps;
    let policy = engine.config.step_retry();

    // Prefer the persisted state; a creation that failed before persisting
    // leaves only the payload to work from.
    let project = retry_step("get_project", policy, || async {
        steps.projects.get(&payload.id).await
    })
    .await?
    .unwrap_or_else(|| payload.clone());

    engine
        .progress(command, CommandRuntimeStatus::Running, "Deleting cloud resources")
        .await;
    retry_step("delete_resources", policy, || async {
        steps.cloud.delete_resources(&project).await
    })
    .await?;

    engine
        .progress(command, CommandRuntimeStatus::Running, "Deleting project")
        .await;
    retry_step("delete_project", policy, || async {
        steps.projects.delete(&project.id).await
    })
    .await?;

    let results = engine.notify_providers(command, false).await?;
    CommandEngine::aggregate_provider_errors(&results)?;

    info!(project_id = %project.id, "Project deleted");
    Ok(None)
}
