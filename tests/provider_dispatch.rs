//! Dispatch protocol tests: fan-out modes, callback resolution, the
//! last-chance fetch, and inline registration of unregistered providers.

use std::sync::Arc;
use std::time::Duration;

use tenancy_core::config::OrchestratorConfig;
use tenancy_core::model::{
    Command, CommandErrorKind, CommandKind, CommandResult, CommandRuntimeStatus, Project, User,
    UserRole,
};
use tenancy_core::orchestration::OrchestrationSystem;
use tenancy_core::test_utils::{
    registered_provider, unregistered_provider, InMemoryAuditTrail, MockBehavior, MockTransport,
    TestCollaborators,
};

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        step_retry_delay_ms: 10,
        monitor_poll_interval_ms: 20,
        external_wait_ceiling_ms: 250,
        ..OrchestratorConfig::default()
    }
}

fn system_with(
    collaborators: &TestCollaborators,
    transport: Arc<MockTransport>,
) -> OrchestrationSystem {
    OrchestrationSystem::new(
        collaborators.collaborators(),
        transport,
        Arc::new(InMemoryAuditTrail::new()),
        test_config(),
    )
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
async fn all_provider_errors_are_collected_without_fail_fast() {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    collaborators.providers.insert(registered_provider("good"));
    collaborators.providers.insert(registered_provider("bad"));
    transport.script("bad", MockBehavior::Reject("unsupported command".into()));
    let system = system_with(&collaborators, transport.clone());

    let project = Project::new("fanout");
    collaborators.projects.insert(project.clone());
    let result = system
        .run_command(Command::new(
            CommandKind::ProjectUpdate(project),
            User::new(UserRole::Admin),
        ))
        .await;

    // The good provider was still delivered to; only the bad one errored.
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, CommandErrorKind::Provider);
    assert!(result.errors[0].message.contains("bad"));
    assert_eq!(transport.sent_to("good").len(), 1);
}

#[tokio::test]
async fn callback_resolves_an_acknowledged_delivery() {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    collaborators.providers.insert(registered_provider("slow"));
    transport.script("slow", MockBehavior::NeverAnswer);
    let system = system_with(&collaborators, transport.clone());

    let project = Project::new("callback");
    collaborators.projects.insert(project.clone());
    let command = Command::new(
        CommandKind::ProjectUpdate(project),
        User::new(UserRole::Admin),
    );
    let command_id = command.command_id;
    system.start_command(command);

    // Wait for the delivery to go out, then resolve its callback before the
    // wait ceiling expires.
    assert!(wait_until(Duration::from_secs(2), || !transport.sent_to("slow").is_empty()).await);
    let callbacks = system.callbacks();
    let delivered = callbacks.deliver(
        command_id,
        "slow",
        CommandResult::completed(command_id, None),
    );
    assert!(delivered);

    let result = system
        .await_result(command_id, Duration::from_secs(5))
        .await
        .expect("command finished");
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn repeat_callbacks_are_ignored() {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    collaborators.providers.insert(registered_provider("slow"));
    transport.script("slow", MockBehavior::NeverAnswer);
    let system = system_with(&collaborators, transport.clone());

    let project = Project::new("idempotent");
    collaborators.projects.insert(project.clone());
    let command = Command::new(
        CommandKind::ProjectUpdate(project),
        User::new(UserRole::Admin),
    );
    let command_id = command.command_id;
    system.start_command(command);
    assert!(wait_until(Duration::from_secs(2), || !transport.sent_to("slow").is_empty()).await);

    let callbacks = system.callbacks();
    assert!(callbacks.deliver(command_id, "slow", CommandResult::completed(command_id, None)));

    // The second delivery carries a different outcome; it must not win.
    let mut contradicting = CommandResult::running(command_id);
    contradicting.push_error(tenancy_core::model::CommandError::new(
        CommandErrorKind::Provider,
        "late failure",
    ));
    contradicting.runtime_status = CommandRuntimeStatus::Failed;
    assert!(!callbacks.deliver(command_id, "slow", contradicting));

    let result = system
        .await_result(command_id, Duration::from_secs(5))
        .await
        .expect("command finished");
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
}

#[tokio::test]
async fn silent_provider_times_out_after_last_chance_fetch() {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    collaborators.providers.insert(registered_provider("mute"));
    transport.script("mute", MockBehavior::NeverAnswer);
    let system = system_with(&collaborators, transport.clone());

    let project = Project::new("timeout");
    collaborators.projects.insert(project.clone());
    let result = system
        .run_command(Command::new(
            CommandKind::ProjectUpdate(project),
            User::new(UserRole::Admin),
        ))
        .await;

    assert_eq!(result.runtime_status, CommandRuntimeStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, CommandErrorKind::Timeout);
    assert!(result.errors[0].message.contains("mute"));
}

#[tokio::test]
async fn transient_transport_failures_are_retried() {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    collaborators.providers.insert(registered_provider("flaky"));
    transport.script("flaky", MockBehavior::flaky(2));
    let system = system_with(&collaborators, transport.clone());

    let project = Project::new("retry");
    collaborators.projects.insert(project.clone());
    let result = system
        .run_command(Command::new(
            CommandKind::ProjectUpdate(project),
            User::new(UserRole::Admin),
        ))
        .await;

    // Two transient failures, then success on the third attempt.
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);
    assert_eq!(transport.sent_to("flaky").len(), 3);
}

#[tokio::test]
async fn unregistered_provider_is_registered_before_first_delivery() {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    let principal_id = uuid::Uuid::new_v4();
    collaborators.providers.insert(unregistered_provider("lazy"));
    transport.script(
        "lazy",
        MockBehavior::Complete(Some(serde_json::json!({
            "principal_id": principal_id,
            "properties": {}
        }))),
    );
    let system = system_with(&collaborators, transport.clone());

    let project = Project::new("inline");
    collaborators.projects.insert(project.clone());
    let result = system
        .run_command(Command::new(
            CommandKind::ProjectUpdate(project),
            User::new(UserRole::Admin),
        ))
        .await;
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);

    // First delivery is the inline register command, then the update itself.
    let messages = transport.sent_to("lazy");
    assert_eq!(messages.len(), 2);
    assert!(matches!(
        messages[0].command.kind,
        CommandKind::ProviderRegister { .. }
    ));
    assert!(matches!(
        messages[1].command.kind,
        CommandKind::ProjectUpdate(_)
    ));
    let stored = collaborators.providers.snapshot("lazy").unwrap();
    assert!(stored.is_registered());
    assert_eq!(stored.principal_id, Some(principal_id));
}

#[tokio::test]
async fn callback_urls_identify_command_and_provider() {
    let collaborators = TestCollaborators::new();
    let transport = Arc::new(MockTransport::new());
    collaborators.providers.insert(registered_provider("addressed"));
    let system = system_with(&collaborators, transport.clone());

    let project = Project::new("urls");
    collaborators.projects.insert(project.clone());
    let command = Command::new(
        CommandKind::ProjectUpdate(project),
        User::new(UserRole::Admin),
    );
    let command_id = command.command_id;
    let result = system.run_command(command).await;
    assert_eq!(result.runtime_status, CommandRuntimeStatus::Completed);

    let messages = transport.sent_to("addressed");
    assert_eq!(messages.len(), 1);
    assert!(messages[0].callback_url.contains(&command_id.to_string()));
    assert!(messages[0].callback_url.ends_with("/addressed"));
}
