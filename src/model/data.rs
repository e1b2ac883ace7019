//! Domain records referenced by command payloads.
//!
//! These are the externally persisted shapes; the document store itself is an
//! external collaborator (see [`crate::orchestration::steps`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;

/// Role a user holds, either org-wide or inside a single project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Creator,
    Member,
    /// Service identity of an external provider.
    Provider,
    /// Internal identity used for compensation and scheduled work.
    System,
    None,
}

/// An organization-level user with optional per-project memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub role: UserRole,
    /// project id -> role within that project
    #[serde(default)]
    pub project_memberships: HashMap<String, UserRole>,
}

impl User {
    pub fn new(role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            project_memberships: HashMap::new(),
        }
    }

    /// Idempotently record a project membership with the given role.
    pub fn ensure_project_membership(&mut self, project_id: &str, role: UserRole) {
        self.project_memberships
            .entry(project_id.to_string())
            .or_insert(role);
    }

    pub fn is_system(&self) -> bool {
        self.role == UserRole::System
    }
}

/// Cloud resource group backing a project, populated during provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub subscription_id: Uuid,
    pub region: String,
    pub id: String,
    pub name: String,
}

/// Managed identity created for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectIdentity {
    pub id: String,
    pub principal_id: Uuid,
}

/// A tenancy project: the unit most commands mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub users: Vec<User>,
    pub resource_group: Option<ResourceGroup>,
    pub identity: Option<ProjectIdentity>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            tags: HashMap::new(),
            users: Vec::new(),
            resource_group: None,
            identity: None,
        }
    }
}

/// An external provider participating in commands via webhook callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub endpoint: Url,
    /// Service principal the provider authenticates as, reported back during
    /// registration.
    pub principal_id: Option<Uuid>,
    /// Set once the provider acknowledged a register command; unregistered
    /// providers get an inline registration before their first dispatch.
    pub registered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Provider {
    pub fn new(id: impl Into<String>, endpoint: Url) -> Self {
        Self {
            id: id.into(),
            endpoint,
            principal_id: None,
            registered: None,
            properties: HashMap::new(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_project_membership_is_idempotent() {
        let mut user = User::new(UserRole::Member);
        user.ensure_project_membership("p-1", UserRole::Provider);
        user.ensure_project_membership("p-1", UserRole::Admin);

        assert_eq!(user.project_memberships.len(), 1);
        assert_eq!(user.project_memberships["p-1"], UserRole::Provider);
    }

    #[test]
    fn new_provider_is_unregistered() {
        let provider = Provider::new("azure-devops", "https://provider.example.com/api".parse().unwrap());
        assert!(!provider.is_registered());
        assert!(provider.principal_id.is_none());
    }
}
