//! # Domain Steps
//!
//! External collaborators invoked as retried steps by the orchestrations:
//! document repositories, cloud resource provisioning, and the system
//! identity lookup. Each call is an atomic black box — retried as a whole on
//! transient failure, never partially.
//!
//! Production implementations live outside this crate (document store,
//! cloud SDKs); `test_utils` ships in-memory implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{Project, Provider, User, UserRole};
use crate::orchestration::errors::OrchestrationResult;

/// Output of a cloud resource deployment, fed back into the project record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentOutput {
    pub resource_group_id: String,
    pub resource_group_name: String,
    pub region: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Result payload of a provider registration, merged into the stored record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationOutput {
    pub principal_id: Option<Uuid>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Bundle of collaborator handles handed to the engine at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub projects: std::sync::Arc<dyn ProjectRepository>,
    pub users: std::sync::Arc<dyn UserRepository>,
    pub providers: std::sync::Arc<dyn ProviderRepository>,
    pub cloud: std::sync::Arc<dyn CloudResources>,
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get(&self, project_id: &str) -> OrchestrationResult<Option<Project>>;
    async fn create(&self, project: Project) -> OrchestrationResult<Project>;
    async fn set(&self, project: Project) -> OrchestrationResult<Project>;
    /// Deleting an unknown project is a no-op, not an error.
    async fn delete(&self, project_id: &str) -> OrchestrationResult<()>;
    /// Organization-level default tags, overriding per-project tags on
    /// creation.
    async fn default_tags(&self) -> OrchestrationResult<HashMap<String, String>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, user_id: Uuid) -> OrchestrationResult<Option<User>>;
    async fn set(&self, user: User) -> OrchestrationResult<User>;
    /// Deleting an unknown user is a no-op.
    async fn delete(&self, user_id: Uuid) -> OrchestrationResult<()>;
    async fn set_membership(
        &self,
        user: User,
        project_id: &str,
        role: UserRole,
    ) -> OrchestrationResult<User>;
    async fn remove_membership(&self, user_id: Uuid, project_id: &str)
        -> OrchestrationResult<()>;
    /// The system identity compensation and scheduled work are attributed to.
    async fn system_user(&self) -> OrchestrationResult<User>;
}

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn get(&self, provider_id: &str) -> OrchestrationResult<Option<Provider>>;
    async fn list(&self) -> OrchestrationResult<Vec<Provider>>;
    async fn set(&self, provider: Provider) -> OrchestrationResult<Provider>;
    /// Deleting an unknown provider is a no-op.
    async fn delete(&self, provider_id: &str) -> OrchestrationResult<()>;
}

/// Cloud-side provisioning operations. The cloud SDKs carry their own retry
/// underneath; this layer adds the 3-attempt step-level retry on top.
#[async_trait]
pub trait CloudResources: Send + Sync {
    async fn select_subscription(&self, project: &Project) -> OrchestrationResult<Uuid>;
    async fn create_resources(
        &self,
        project: &Project,
        subscription_id: Uuid,
    ) -> OrchestrationResult<DeploymentOutput>;
    async fn create_identity(
        &self,
        project: &Project,
    ) -> OrchestrationResult<crate::model::ProjectIdentity>;
    async fn tag_resources(&self, project: &Project) -> OrchestrationResult<()>;
    /// Idempotent teardown: resources that were never provisioned (or are
    /// already gone) count as deleted, so compensation can run against
    /// partially provisioned projects.
    async fn delete_resources(&self, project: &Project) -> OrchestrationResult<()>;
}
