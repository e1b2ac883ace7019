//! Command envelopes and the closed set of command kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::data::{Project, Provider, User};

/// The closed set of administrative intents the control plane executes.
///
/// One orchestration handler exists per kind; the engine matches exhaustively
/// so unhandled kinds cannot slip through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum CommandKind {
    ProjectCreate(Project),
    ProjectUpdate(Project),
    ProjectDelete(Project),
    ProjectUserCreate { project_id: String, user: User },
    ProjectUserUpdate { project_id: String, user: User },
    ProjectUserDelete { project_id: String, user: User },
    ProviderCreate(Provider),
    ProviderUpdate(Provider),
    ProviderDelete(Provider),
    /// (Re-)register one provider, or all when no id is given.
    ProviderRegister { provider_id: Option<String> },
    OrgUserCreate(User),
    OrgUserUpdate(User),
    OrgUserDelete(User),
}

impl CommandKind {
    /// Serialization key of the resource this command mutates.
    ///
    /// Commands sharing a key are admitted one at a time. `ProviderRegister`
    /// returns `None` because registration takes the provider-collection lock
    /// internally instead.
    pub fn resource_key(&self) -> Option<String> {
        match self {
            Self::ProjectCreate(p) | Self::ProjectUpdate(p) | Self::ProjectDelete(p) => {
                Some(format!("project/{}", p.id))
            }
            Self::ProjectUserCreate { project_id, .. }
            | Self::ProjectUserUpdate { project_id, .. }
            | Self::ProjectUserDelete { project_id, .. } => Some(format!("project/{project_id}")),
            Self::ProviderCreate(p) | Self::ProviderUpdate(p) | Self::ProviderDelete(p) => {
                Some(format!("provider/{}", p.id))
            }
            Self::ProviderRegister { .. } => None,
            Self::OrgUserCreate(_) | Self::OrgUserUpdate(_) | Self::OrgUserDelete(_) => {
                Some("org/users".to_string())
            }
        }
    }

    /// Creation kinds are the ones eligible for automatic compensation.
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            Self::ProjectCreate(_)
                | Self::ProjectUserCreate { .. }
                | Self::ProviderCreate(_)
                | Self::OrgUserCreate(_)
        )
    }

    pub fn is_provider_register(&self) -> bool {
        matches!(self, Self::ProviderRegister { .. })
    }

    /// The corrective delete started when a creation command fails after its
    /// record was persisted. Non-creation kinds have no compensation.
    pub fn compensating_delete(&self) -> Option<CommandKind> {
        match self {
            Self::ProjectCreate(p) => Some(Self::ProjectDelete(p.clone())),
            Self::ProjectUserCreate { project_id, user } => Some(Self::ProjectUserDelete {
                project_id: project_id.clone(),
                user: user.clone(),
            }),
            Self::ProviderCreate(p) => Some(Self::ProviderDelete(p.clone())),
            Self::OrgUserCreate(u) => Some(Self::OrgUserDelete(u.clone())),
            _ => None,
        }
    }

    /// Short name used in audit entries and tracing fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProjectCreate(_) => "project_create",
            Self::ProjectUpdate(_) => "project_update",
            Self::ProjectDelete(_) => "project_delete",
            Self::ProjectUserCreate { .. } => "project_user_create",
            Self::ProjectUserUpdate { .. } => "project_user_update",
            Self::ProjectUserDelete { .. } => "project_user_delete",
            Self::ProviderCreate(_) => "provider_create",
            Self::ProviderUpdate(_) => "provider_update",
            Self::ProviderDelete(_) => "provider_delete",
            Self::ProviderRegister { .. } => "provider_register",
            Self::OrgUserCreate(_) => "org_user_create",
            Self::OrgUserUpdate(_) => "org_user_update",
            Self::OrgUserDelete(_) => "org_user_delete",
        }
    }
}

/// A typed request to change a resource's state.
///
/// The command id doubles as the orchestration instance id: status lookups,
/// admission slots, and result channels are all keyed by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command_id: Uuid,
    pub kind: CommandKind,
    pub issued_by: User,
    /// Set when another orchestration spawned this command (compensation,
    /// registration fan-out); preserved in the audit trail.
    pub parent_command_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Command {
    pub fn new(kind: CommandKind, issued_by: User) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            kind,
            issued_by,
            parent_command_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn spawned_by(kind: CommandKind, issued_by: User, parent_command_id: Uuid) -> Self {
        Self {
            parent_command_id: Some(parent_command_id),
            ..Self::new(kind, issued_by)
        }
    }

    pub fn resource_key(&self) -> Option<String> {
        self.kind.resource_key()
    }
}

/// Wire unit sent to a provider endpoint: the command plus the callback URL
/// the provider resolves asynchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCommandMessage {
    pub command: Command,
    pub callback_url: String,
}

/// Links a waiting orchestration instance to the predecessor instance it
/// monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorNotification {
    /// The waiter (instance whose channel gets signaled).
    pub instance_id: Uuid,
    /// The watched predecessor instance.
    pub correlation_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::data::UserRole;

    #[test]
    fn membership_commands_key_on_owning_project() {
        let kind = CommandKind::ProjectUserCreate {
            project_id: "p-42".into(),
            user: User::new(UserRole::Member),
        };
        assert_eq!(kind.resource_key().as_deref(), Some("project/p-42"));
    }

    #[test]
    fn provider_commands_key_on_their_own_record() {
        let provider = Provider::new("github", "https://gh.example.com".parse().unwrap());
        let kind = CommandKind::ProviderUpdate(provider);
        assert_eq!(kind.resource_key().as_deref(), Some("provider/github"));
    }

    #[test]
    fn register_has_no_admission_key() {
        assert_eq!(
            CommandKind::ProviderRegister { provider_id: None }.resource_key(),
            None
        );
    }

    #[test]
    fn only_creation_kinds_compensate() {
        let project = Project::new("contoso");
        assert!(CommandKind::ProjectCreate(project.clone()).is_create());
        assert!(matches!(
            CommandKind::ProjectCreate(project.clone()).compensating_delete(),
            Some(CommandKind::ProjectDelete(_))
        ));
        assert_eq!(
            CommandKind::ProjectUpdate(project).compensating_delete(),
            None
        );
    }

    #[test]
    fn command_kind_round_trips_through_serde() {
        let command = Command::new(
            CommandKind::ProjectCreate(Project::new("contoso")),
            User::new(UserRole::Creator),
        );
        let json = serde_json::to_string(&command).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(back, command);
    }
}
