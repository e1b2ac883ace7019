//! # Test Utilities
//!
//! In-memory implementations of every external collaborator, plus a
//! scriptable provider transport. These back both the unit tests and the
//! integration suites; nothing here touches the network or disk.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::audit::{AuditTrail, CommandAuditEntry};
use crate::dispatch::{ProviderTransport, TransportError};
use crate::model::{
    CommandResult, Project, ProjectIdentity, Provider, ProviderCommandMessage, User, UserRole,
};
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::orchestration::steps::{
    CloudResources, Collaborators, DeploymentOutput, ProjectRepository, ProviderRepository,
    UserRepository,
};

/// In-memory project store.
#[derive(Default)]
pub struct InMemoryProjects {
    projects: Mutex<HashMap<String, Project>>,
    default_tags: Mutex<HashMap<String, String>>,
}

impl InMemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_tags(tags: HashMap<String, String>) -> Self {
        Self {
            projects: Mutex::new(HashMap::new()),
            default_tags: Mutex::new(tags),
        }
    }

    pub fn insert(&self, project: Project) {
        self.projects.lock().insert(project.id.clone(), project);
    }

    pub fn contains(&self, project_id: &str) -> bool {
        self.projects.lock().contains_key(project_id)
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjects {
    async fn get(&self, project_id: &str) -> OrchestrationResult<Option<Project>> {
        Ok(self.projects.lock().get(project_id).cloned())
    }

    async fn create(&self, project: Project) -> OrchestrationResult<Project> {
        let mut projects = self.projects.lock();
        if projects.contains_key(&project.id) {
            return Err(OrchestrationError::validation(format!(
                "project '{}' already exists",
                project.id
            )));
        }
        projects.insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn set(&self, project: Project) -> OrchestrationResult<Project> {
        self.projects
            .lock()
            .insert(project.id.clone(), project.clone());
        Ok(project)
    }

    async fn delete(&self, project_id: &str) -> OrchestrationResult<()> {
        self.projects.lock().remove(project_id);
        Ok(())
    }

    async fn default_tags(&self) -> OrchestrationResult<HashMap<String, String>> {
        Ok(self.default_tags.lock().clone())
    }
}

/// In-memory user store with a fixed system identity.
pub struct InMemoryUsers {
    users: Mutex<HashMap<Uuid, User>>,
    system: User,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            system: User::new(UserRole::System),
        }
    }

    pub fn insert(&self, user: User) {
        self.users.lock().insert(user.id, user);
    }

    pub fn system_user_id(&self) -> Uuid {
        self.system.id
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.users.lock().contains_key(&user_id)
    }
}

impl Default for InMemoryUsers {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryUsers {
    async fn get(&self, user_id: Uuid) -> OrchestrationResult<Option<User>> {
        Ok(self.users.lock().get(&user_id).cloned())
    }

    async fn set(&self, user: User) -> OrchestrationResult<User> {
        self.users.lock().insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete(&self, user_id: Uuid) -> OrchestrationResult<()> {
        self.users.lock().remove(&user_id);
        Ok(())
    }

    async fn set_membership(
        &self,
        mut user: User,
        project_id: &str,
        role: UserRole,
    ) -> OrchestrationResult<User> {
        user.project_memberships.insert(project_id.to_string(), role);
        self.users.lock().insert(user.id, user.clone());
        Ok(user)
    }

    async fn remove_membership(
        &self,
        user_id: Uuid,
        project_id: &str,
    ) -> OrchestrationResult<()> {
        if let Some(user) = self.users.lock().get_mut(&user_id) {
            user.project_memberships.remove(project_id);
        }
        Ok(())
    }

    async fn system_user(&self) -> OrchestrationResult<User> {
        Ok(self.system.clone())
    }
}

/// In-memory provider store.
#[derive(Default)]
pub struct InMemoryProviders {
    providers: Mutex<HashMap<String, Provider>>,
}

impl InMemoryProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, provider: Provider) {
        self.providers.lock().insert(provider.id.clone(), provider);
    }

    pub fn snapshot(&self, provider_id: &str) -> Option<Provider> {
        self.providers.lock().get(provider_id).cloned()
    }
}

#[async_trait]
impl ProviderRepository for InMemoryProviders {
    async fn get(&self, provider_id: &str) -> OrchestrationResult<Option<Provider>> {
        Ok(self.providers.lock().get(provider_id).cloned())
    }

    async fn list(&self) -> OrchestrationResult<Vec<Provider>> {
        let mut all: Vec<Provider> = self.providers.lock().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn set(&self, provider: Provider) -> OrchestrationResult<Provider> {
        self.providers
            .lock()
            .insert(provider.id.clone(), provider.clone());
        Ok(provider)
    }

    async fn delete(&self, provider_id: &str) -> OrchestrationResult<()> {
        self.providers.lock().remove(provider_id);
        Ok(())
    }
}

/// In-memory cloud with failure injection and provisioning bookkeeping.
#[derive(Default)]
pub struct InMemoryCloud {
    fail_create_resources: AtomicBool,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next (and every subsequent) `create_resources` call fail
    /// with a non-transient error.
    pub fn fail_create_resources(&self) {
        self.fail_create_resources.store(true, Ordering::SeqCst);
    }

    pub fn created_projects(&self) -> Vec<String> {
        self.created.lock().clone()
    }

    pub fn deleted_projects(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl CloudResources for InMemoryCloud {
    async fn select_subscription(&self, _project: &Project) -> OrchestrationResult<Uuid> {
        Ok(Uuid::new_v4())
    }

    async fn create_resources(
        &self,
        project: &Project,
        subscription_id: Uuid,
    ) -> OrchestrationResult<DeploymentOutput> {
        if self.fail_create_resources.load(Ordering::SeqCst) {
            return Err(OrchestrationError::internal(format!(
                "deployment rejected for project '{}'",
                project.id
            )));
        }
        self.created.lock().push(project.id.clone());
        Ok(DeploymentOutput {
            resource_group_id: format!("/subscriptions/{subscription_id}/rg-{}", project.id),
            resource_group_name: format!("rg-{}", project.id),
            region: "westeurope".to_string(),
            properties: HashMap::new(),
        })
    }

    async fn create_identity(&self, project: &Project) -> OrchestrationResult<ProjectIdentity> {
        Ok(ProjectIdentity {
            id: format!("identity-{}", project.id),
            principal_id: Uuid::new_v4(),
        })
    }

    async fn tag_resources(&self, _project: &Project) -> OrchestrationResult<()> {
        Ok(())
    }

    async fn delete_resources(&self, project: &Project) -> OrchestrationResult<()> {
        self.deleted.lock().push(project.id.clone());
        Ok(())
    }
}

/// Audit sink that records entries for later assertions.
#[derive(Default)]
pub struct InMemoryAuditTrail {
    entries: Mutex<Vec<CommandAuditEntry>>,
}

impl InMemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<CommandAuditEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl AuditTrail for InMemoryAuditTrail {
    async fn append(&self, entry: CommandAuditEntry) {
        self.entries.lock().push(entry);
    }

    async fn entries_for(&self, command_id: Uuid) -> Vec<CommandAuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.command_id == command_id)
            .cloned()
            .collect()
    }
}

/// Scripted behavior of a [`MockTransport`] for one provider.
#[derive(Clone)]
pub enum MockBehavior {
    /// Answer every send with a completed result carrying this payload.
    Complete(Option<serde_json::Value>),
    /// Acknowledge with a running result and never resolve the callback.
    /// The last-chance fetch also reports the command still running.
    NeverAnswer,
    /// Refuse the delivery outright (non-transient transport error).
    Reject(String),
    /// Fail transiently this many times, then complete.
    FlakyThenComplete(Arc<AtomicU32>),
}

impl MockBehavior {
    pub fn flaky(failures: u32) -> Self {
        Self::FlakyThenComplete(Arc::new(AtomicU32::new(failures)))
    }
}

/// Provider transport with per-provider scripted behaviors and a record of
/// every message it was asked to deliver.
#[derive(Default)]
pub struct MockTransport {
    behaviors: Mutex<HashMap<String, MockBehavior>>,
    sent: Mutex<Vec<(String, ProviderCommandMessage)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, provider_id: &str, behavior: MockBehavior) {
        self.behaviors
            .lock()
            .insert(provider_id.to_string(), behavior);
    }

    /// Every message delivered so far, in delivery order.
    pub fn sent(&self) -> Vec<(String, ProviderCommandMessage)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, provider_id: &str) -> Vec<ProviderCommandMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| id == provider_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn behavior_for(&self, provider_id: &str) -> MockBehavior {
        self.behaviors
            .lock()
            .get(provider_id)
            .cloned()
            .unwrap_or(MockBehavior::Complete(None))
    }
}

#[async_trait]
impl ProviderTransport for MockTransport {
    async fn send(
        &self,
        provider: &Provider,
        message: &ProviderCommandMessage,
    ) -> Result<CommandResult, TransportError> {
        self.sent
            .lock()
            .push((provider.id.clone(), message.clone()));

        let command_id = message.command.command_id;
        match self.behavior_for(&provider.id) {
            MockBehavior::Complete(payload) => Ok(CommandResult::completed(command_id, payload)),
            MockBehavior::NeverAnswer => Ok(CommandResult::running(command_id)),
            MockBehavior::Reject(message) => Err(TransportError::Rejected {
                provider_id: provider.id.clone(),
                message,
            }),
            MockBehavior::FlakyThenComplete(remaining) => {
                if remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    Err(TransportError::Unreachable {
                        provider_id: provider.id.clone(),
                        message: "connection reset".to_string(),
                    })
                } else {
                    Ok(CommandResult::completed(command_id, None))
                }
            }
        }
    }

    async fn fetch_result(
        &self,
        provider: &Provider,
        command_id: Uuid,
    ) -> Result<CommandResult, TransportError> {
        match self.behavior_for(&provider.id) {
            MockBehavior::NeverAnswer => Ok(CommandResult::running(command_id)),
            MockBehavior::Reject(message) => Err(TransportError::Rejected {
                provider_id: provider.id.clone(),
                message,
            }),
            _ => Ok(CommandResult::completed(command_id, None)),
        }
    }
}

/// One bundle of fresh in-memory collaborators plus handles for assertions.
pub struct TestCollaborators {
    pub projects: Arc<InMemoryProjects>,
    pub users: Arc<InMemoryUsers>,
    pub providers: Arc<InMemoryProviders>,
    pub cloud: Arc<InMemoryCloud>,
}

impl TestCollaborators {
    pub fn new() -> Self {
        Self {
            projects: Arc::new(InMemoryProjects::new()),
            users: Arc::new(InMemoryUsers::new()),
            providers: Arc::new(InMemoryProviders::new()),
            cloud: Arc::new(InMemoryCloud::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            projects: self.projects.clone(),
            users: self.users.clone(),
            providers: self.providers.clone(),
            cloud: self.cloud.clone(),
        }
    }
}

impl Default for TestCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

/// A provider stub pointing at a loopback endpoint nothing listens on. The
/// `registered` stamp is set so dispatch skips inline registration.
pub fn registered_provider(id: &str) -> Provider {
    let endpoint: Url = format!("http://127.0.0.1:9/{id}")
        .parse()
        .unwrap_or_else(|_| unreachable!("static endpoint is a valid url"));
    Provider {
        registered: Some(chrono::Utc::now()),
        ..Provider::new(id, endpoint)
    }
}

/// An unregistered provider stub, for inline-registration paths.
pub fn unregistered_provider(id: &str) -> Provider {
    let endpoint: Url = format!("http://127.0.0.1:9/{id}")
        .parse()
        .unwrap_or_else(|_| unreachable!("static endpoint is a valid url"));
    Provider::new(id, endpoint)
}
