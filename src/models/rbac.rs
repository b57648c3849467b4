use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::models::membership::BuiltInRole;

// =============================================================================
// RESOURCE & ACTION
// =============================================================================

/// Protected capability area inside an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Domains,
    Team,
    Settings,
    Properties,
    Owners,
    Board,
}

impl Resource {
    pub const ALL: [Resource; 6] = [
        Resource::Domains,
        Resource::Team,
        Resource::Settings,
        Resource::Properties,
        Resource::Owners,
        Resource::Board,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Domains => "domains",
            Resource::Team => "team",
            Resource::Settings => "settings",
            Resource::Properties => "properties",
            Resource::Owners => "owners",
            Resource::Board => "board",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| AppError::bad_request(format!("unknown resource: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| AppError::bad_request(format!("unknown action: {s}")))
    }
}

// =============================================================================
// GRANT
// =============================================================================

/// A set of allowed actions over one resource, as submitted by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Grant {
    pub resource: Resource,
    #[schema(value_type = Vec<Action>)]
    pub actions: BTreeSet<Action>,
}

impl Grant {
    pub fn new(resource: Resource, actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            resource,
            actions: actions.into_iter().collect(),
        }
    }

    pub fn allows(&self, resource: Resource, action: Action) -> bool {
        self.resource == resource && self.actions.contains(&action)
    }
}

/// Collapses grants to one entry per resource (actions unioned), drops empty
/// ones, and orders them by resource.
pub fn normalize_grants(grants: impl IntoIterator<Item = Grant>) -> Vec<Grant> {
    let mut merged: BTreeMap<Resource, BTreeSet<Action>> = BTreeMap::new();
    for grant in grants {
        merged.entry(grant.resource).or_default().extend(grant.actions);
    }

    merged
        .into_iter()
        .filter(|(_, actions)| !actions.is_empty())
        .map(|(resource, actions)| Grant { resource, actions })
        .collect()
}

// =============================================================================
// PERMISSION
// =============================================================================

/// Who a permission row is attached to. Never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionSubject {
    Role { role_id: Uuid },
    /// Direct grant. `source_role_id` is set when it was copied from a role.
    User {
        user_id: Uuid,
        source_role_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub resource: Resource,
    #[schema(value_type = Vec<Action>)]
    pub actions: BTreeSet<Action>,
    #[schema(value_type = Object)]
    pub subject: PermissionSubject,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn grant(&self) -> Grant {
        Grant {
            resource: self.resource,
            actions: self.actions.clone(),
        }
    }
}

impl Loggable for Permission {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> Uuid {
        match self.subject {
            PermissionSubject::Role { role_id } => role_id,
            PermissionSubject::User { user_id, .. } => user_id,
        }
    }
    fn severity(&self) -> Severity { Severity::Critical }
}

// =============================================================================
// CUSTOM ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomRole {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for CustomRole {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleDetail {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub permissions: Vec<Grant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleDetail {
    pub fn new(role: CustomRole, permissions: Vec<Grant>) -> Self {
        Self {
            id: role.id,
            organization_id: role.organization_id,
            name: role.name,
            permissions,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

impl Loggable for RoleDetail {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Body for both role creation and full role replacement.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleRequest {
    #[schema(example = "Editor")]
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<Grant>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    /// `null` clears every granular permission of the member.
    pub role_id: Option<Uuid>,
}

// =============================================================================
// DIRECT GRANTS & CHECKS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantPermissionRequest {
    pub resource: Resource,
    #[schema(value_type = Vec<Action>)]
    pub actions: BTreeSet<Action>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckPermissionQuery {
    pub resource: Resource,
    pub action: Action,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckPermissionResponse {
    pub allowed: bool,
}

// =============================================================================
// EFFECTIVE PERMISSIONS (computed)
// =============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: BuiltInRole,
    pub custom_role_id: Option<Uuid>,
    pub permissions: Vec<EffectivePermission>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermission {
    pub resource: Resource,
    #[schema(value_type = Vec<Action>)]
    pub actions: BTreeSet<Action>,
    /// Source of the grant: "direct" or "role"
    #[schema(example = "role")]
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_merges_duplicate_resources_and_drops_empty() {
        let grants = vec![
            Grant::new(Resource::Team, [Action::Read]),
            Grant::new(Resource::Domains, [Action::Update]),
            Grant::new(Resource::Domains, [Action::Read, Action::Update]),
            Grant::new(Resource::Settings, []),
        ];

        let normalized = normalize_grants(grants);

        assert_eq!(
            normalized,
            vec![
                Grant::new(Resource::Domains, [Action::Read, Action::Update]),
                Grant::new(Resource::Team, [Action::Read]),
            ]
        );
    }

    #[test]
    fn resource_and_action_parse_case_insensitively() {
        assert_eq!("Domains".parse::<Resource>().unwrap(), Resource::Domains);
        assert_eq!(" DELETE ".parse::<Action>().unwrap(), Action::Delete);
        assert!("billing".parse::<Resource>().is_err());
        assert!("publish".parse::<Action>().is_err());
    }

    #[test]
    fn grant_allows_only_exact_pairs() {
        let grant = Grant::new(Resource::Domains, [Action::Read, Action::Update]);
        assert!(grant.allows(Resource::Domains, Action::Update));
        assert!(!grant.allows(Resource::Domains, Action::Delete));
        assert!(!grant.allows(Resource::Team, Action::Read));
    }
}
