//! Per-resource serialization tests: commands on the same resource run one
//! at a time, commands on different resources run concurrently.

use std::sync::Arc;
use std::time::Duration;

use tenancy_core::audit::AuditTrail;
use tenancy_core::config::OrchestratorConfig;
use tenancy_core::model::{
    Command, CommandKind, CommandRuntimeStatus, Project, User, UserRole,
};
use tenancy_core::orchestration::OrchestrationSystem;
use tenancy_core::test_utils::{
    registered_provider, InMemoryAuditTrail, MockBehavior, MockTransport, TestCollaborators,
};

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        step_retry_delay_ms: 10,
        monitor_poll_interval_ms: 20,
        external_wait_ceiling_ms: 250,
        ..OrchestratorConfig::default()
    }
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

#[tokio::test]
async fn successor_on_same_project_waits_for_the_predecessor() {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    let audit = Arc::new(InMemoryAuditTrail::new());
    collaborators.providers.insert(registered_provider("slow"));
    // The first update stalls on a provider that never answers its callback.
    transport.script("slow", MockBehavior::NeverAnswer);
    let system = OrchestrationSystem::new(
        collaborators.collaborators(),
        transport.clone(),
        audit.clone(),
        test_config(),
    );

    let project = Project::new("contended");
    collaborators.projects.insert(project.clone());

    let first = Command::new(
        CommandKind::ProjectUpdate(project.clone()),
        User::new(UserRole::Admin),
    );
    let first_id = first.command_id;
    system.start_command(first);
    assert!(wait_until(Duration::from_secs(2), || !transport.sent_to("slow").is_empty()).await);

    // Unblock deliveries for the successor before starting it.
    transport.script("slow", MockBehavior::Complete(None));
    let second = Command::new(
        CommandKind::ProjectUpdate(project.clone()),
        User::new(UserRole::Admin),
    );
    let second_id = second.command_id;
    system.start_command(second);

    let second_result = system
        .await_result(second_id, Duration::from_secs(5))
        .await
        .expect("successor finished");
    assert_eq!(second_result.runtime_status, CommandRuntimeStatus::Completed);

    // The predecessor reaches its terminal status too, and the successor
    // recorded that it waited for it.
    assert!(wait_until(Duration::from_secs(5), || system.statuses().is_final(first_id)).await);
    let waited = audit
        .entries_for(second_id)
        .await
        .iter()
        .any(|entry| entry.message.contains(&format!("Waiting for command {first_id}")));
    assert!(waited, "successor never waited on the predecessor");
}

#[tokio::test]
async fn commands_on_different_projects_do_not_block_each_other() {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    collaborators.providers.insert(registered_provider("slow"));
    transport.script("slow", MockBehavior::NeverAnswer);
    let system = OrchestrationSystem::new(
        collaborators.collaborators(),
        transport.clone(),
        Arc::new(InMemoryAuditTrail::new()),
        test_config(),
    );

    let stalled = Project::new("stalled");
    collaborators.projects.insert(stalled.clone());
    system.start_command(Command::new(
        CommandKind::ProjectUpdate(stalled),
        User::new(UserRole::Admin),
    ));
    assert!(wait_until(Duration::from_secs(2), || !transport.sent_to("slow").is_empty()).await);

    // An org-user command keys on a different resource and passes straight
    // through while the project command is still stalled.
    let user = User::new(UserRole::Member);
    let independent = Command::new(
        CommandKind::OrgUserCreate(user),
        User::new(UserRole::Admin),
    );
    let independent_id = independent.command_id;
    transport.script("slow", MockBehavior::Complete(None));
    system.start_command(independent);

    let result = system
        .await_result(independent_id, Duration::from_secs(5))
        .await
        .expect("independent command finished");
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
}

#[tokio::test]
async fn finished_predecessors_do_not_delay_admission() {
    let collaborators = TestCollaborators::new();
    let system = OrchestrationSystem::new(
        collaborators.collaborators(),
        Arc::new(MockTransport::new()),
        Arc::new(InMemoryAuditTrail::new()),
        test_config(),
    );

    let project = Project::new("sequential");
    collaborators.projects.insert(project.clone());

    // Three sequential updates on the same project; each predecessor is
    // already final when the next one is admitted, so none of them waits a
    // single monitor poll.
    for _ in 0..3 {
        let started = tokio::time::Instant::now();
        let result = system
            .run_command(Command::new(
                CommandKind::ProjectUpdate(project.clone()),
                User::new(UserRole::Admin),
            ))
            .await;
        assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
