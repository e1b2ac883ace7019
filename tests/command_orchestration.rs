//! End-to-end orchestration tests: full command runs through the wired
//! system with in-memory collaborators and a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use tenancy_core::audit::AuditTrail;
use tenancy_core::config::OrchestratorConfig;
use tenancy_core::model::{Command, CommandErrorKind, CommandKind, CommandRuntimeStatus, Project, User, UserRole};
use tenancy_core::orchestration::OrchestrationSystem;
use tenancy_core::test_utils::{
    registered_provider, MockBehavior, MockTransport, TestCollaborators,
};

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        step_retry_delay_ms: 10,
        monitor_poll_interval_ms: 20,
        external_wait_ceiling_ms: 250,
        ..OrchestratorConfig::default()
    }
}

struct Harness {
    collaborators: TestCollaborators,
    transport: Arc<MockTransport>,
    audit: Arc<tenancy_core::test_utils::InMemoryAuditTrail>,
    system: OrchestrationSystem,
}

fn harness() -> Harness {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    let audit = Arc::new(tenancy_core::test_utils::InMemoryAuditTrail::new());
    let system = OrchestrationSystem::new(
        collaborators.collaborators(),
        transport.clone(),
        audit.clone(),
        test_config(),
    );
    Harness {
        collaborators,
        transport,
        audit,
        system,
    }
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn project_create_provisions_and_notifies_providers() {
    let h = harness();
    h.collaborators
        .providers
        .insert(registered_provider("provider-a"));

    let project = Project::new("alpha");
    let project_id = project.id.clone();
    let command = Command::new(
        CommandKind::ProjectCreate(project),
        User::new(UserRole::Creator),
    );

    let result = h.system.run_command(command).await;

    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
    assert!(result.errors.is_empty());
    assert!(h.collaborators.projects.contains(&project_id));
    assert_eq!(h.collaborators.cloud.created_projects(), vec![project_id.clone()]);

    // The stored project carries the provisioned resource group and identity.
    let stored: Project =
        serde_json::from_value(result.result.expect("create returns the project")).unwrap();
    assert!(stored.resource_group.is_some());
    assert!(stored.identity.is_some());

    // Exactly one delivery went out, to provider-a.
    assert_eq!(h.transport.sent_to("provider-a").len(), 1);
}

#[tokio::test]
async fn project_create_times_out_on_silent_provider_and_compensates() {
    let h = harness();
    h.collaborators
        .providers
        .insert(registered_provider("provider-a"));
    h.collaborators
        .providers
        .insert(registered_provider("provider-b"));
    h.transport.script("provider-b", MockBehavior::NeverAnswer);

    let project = Project::new("beta");
    let project_id = project.id.clone();
    let command = Command::new(
        CommandKind::ProjectCreate(project),
        User::new(UserRole::Creator),
    );
    let create_id = command.command_id;

    let result = h.system.run_command(command).await;

    assert_eq!(result.runtime_status, CommandRuntimeStatus::Failed);
    let timeout = result
        .errors
        .iter()
        .find(|e| e.kind == CommandErrorKind::Timeout)
        .expect("timeout error recorded");
    assert!(timeout.message.contains("provider-b"));

    // Compensation runs detached: eventually the cloud resources are torn
    // down and the project record is gone.
    assert!(
        wait_until(Duration::from_secs(5), || {
            h.collaborators
                .cloud
                .deleted_projects()
                .contains(&project_id)
        })
        .await
    );
    assert!(
        wait_until(Duration::from_secs(5), || {
            !h.collaborators.projects.contains(&project_id)
        })
        .await
    );

    // The compensating delete is attributed to the system identity and
    // linked to the failed create.
    assert!(
        wait_until(Duration::from_secs(5), || {
            h.transport.sent().iter().any(|(_, message)| {
                matches!(message.command.kind, CommandKind::ProjectDelete(_))
                    && message.command.issued_by.is_system()
                    && message.command.parent_command_id == Some(create_id)
            })
        })
        .await
    );
}

#[tokio::test]
async fn project_update_failure_does_not_compensate() {
    let h = harness();
    h.collaborators
        .providers
        .insert(registered_provider("provider-a"));
    h.transport
        .script("provider-a", MockBehavior::Reject("bad payload".into()));

    let project = Project::new("gamma");
    h.collaborators.projects.insert(project.clone());

    let result = h
        .system
        .run_command(Command::new(
            CommandKind::ProjectUpdate(project.clone()),
            User::new(UserRole::Admin),
        ))
        .await;

    assert_eq!(result.runtime_status, CommandRuntimeStatus::Failed);
    // No compensating delete: the project and its resources stay put.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.collaborators.projects.contains(&project.id));
    assert!(h.collaborators.cloud.deleted_projects().is_empty());
}

#[tokio::test]
async fn membership_command_requires_existing_project() {
    let h = harness();

    let result = h
        .system
        .run_command(Command::new(
            CommandKind::ProjectUserCreate {
                project_id: "no-such-project".to_string(),
                user: User::new(UserRole::Member),
            },
            User::new(UserRole::Admin),
        ))
        .await;

    assert_eq!(result.runtime_status, CommandRuntimeStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, CommandErrorKind::Validation);
}

#[tokio::test]
async fn membership_set_and_remove_round_trip() {
    let h = harness();
    let project = Project::new("delta");
    h.collaborators.projects.insert(project.clone());

    let mut member = User::new(UserRole::Member);
    member.ensure_project_membership(&project.id, UserRole::Admin);
    h.collaborators.users.insert(member.clone());

    let result = h
        .system
        .run_command(Command::new(
            CommandKind::ProjectUserCreate {
                project_id: project.id.clone(),
                user: member.clone(),
            },
            User::new(UserRole::Admin),
        ))
        .await;
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
    let stored: User = serde_json::from_value(result.result.unwrap()).unwrap();
    assert_eq!(stored.project_memberships[&project.id], UserRole::Admin);

    let result = h
        .system
        .run_command(Command::new(
            CommandKind::ProjectUserDelete {
                project_id: project.id.clone(),
                user: member.clone(),
            },
            User::new(UserRole::Admin),
        ))
        .await;
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
}

#[tokio::test]
async fn org_user_commands_mutate_the_user_collection() {
    let h = harness();
    let user = User::new(UserRole::Member);

    let result = h
        .system
        .run_command(Command::new(
            CommandKind::OrgUserCreate(user.clone()),
            User::new(UserRole::Admin),
        ))
        .await;
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
    assert!(h.collaborators.users.contains(user.id));

    let result = h
        .system
        .run_command(Command::new(
            CommandKind::OrgUserDelete(user.clone()),
            User::new(UserRole::Admin),
        ))
        .await;
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
    assert!(!h.collaborators.users.contains(user.id));
}

#[tokio::test]
async fn provider_create_registers_and_persists() {
    let h = harness();
    let provider = tenancy_core::test_utils::unregistered_provider("fresh");
    let principal_id = uuid::Uuid::new_v4();
    h.transport.script(
        "fresh",
        MockBehavior::Complete(Some(serde_json::json!({
            "principal_id": principal_id,
            "properties": { "version": "1.2.0" }
        }))),
    );

    let result = h
        .system
        .run_command(Command::new(
            CommandKind::ProviderCreate(provider),
            User::new(UserRole::Admin),
        ))
        .await;

    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
    let stored = h.collaborators.providers.snapshot("fresh").unwrap();
    assert!(stored.is_registered());
    assert_eq!(stored.principal_id, Some(principal_id));
    assert_eq!(stored.properties["version"], "1.2.0");
}

#[tokio::test]
async fn terminal_results_reach_detached_waiters() {
    let h = harness();
    let project = Project::new("epsilon");
    let command = Command::new(
        CommandKind::ProjectCreate(project),
        User::new(UserRole::Creator),
    );
    let command_id = command.command_id;

    h.system.start_command(command);
    let result = h
        .system
        .await_result(command_id, Duration::from_secs(5))
        .await
        .expect("terminal result delivered");

    assert_eq!(result.command_id, command_id);
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
    assert_eq!(
        h.system.statuses().status_of(command_id),
        Some(CommandRuntimeStatus::Completed)
    );
    // The run leaves an audit trail ending in the terminal entry.
    let entries = h.audit.entries_for(command_id).await;
    assert!(entries.last().unwrap().message.contains("succeeded"));
}
