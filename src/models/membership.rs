use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

/// Role stored directly on a membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuiltInRole {
    Owner,
    Admin,
    Editor,
    Member,
}

impl BuiltInRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltInRole::Owner => "OWNER",
            BuiltInRole::Admin => "ADMIN",
            BuiltInRole::Editor => "EDITOR",
            BuiltInRole::Member => "MEMBER",
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, BuiltInRole::Owner)
    }
}

impl fmt::Display for BuiltInRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuiltInRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OWNER" => Ok(BuiltInRole::Owner),
            "ADMIN" => Ok(BuiltInRole::Admin),
            "EDITOR" => Ok(BuiltInRole::Editor),
            "MEMBER" => Ok(BuiltInRole::Member),
            other => Err(AppError::bad_request(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Membership {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub role: BuiltInRole,
    /// Custom role last assigned to this member, if any.
    pub custom_role_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(organization_id: Uuid, user_id: Uuid, role: BuiltInRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            user_id,
            role,
            custom_role_id: None,
            created_at: Utc::now(),
        }
    }
}

impl Loggable for Membership {
    fn entity_type() -> &'static str { "membership" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity {
        if self.role.is_owner() {
            Severity::Critical
        } else {
            Severity::Important
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    #[schema(example = "agent@example.com")]
    pub email: String,
    /// Defaults to MEMBER.
    pub role: Option<BuiltInRole>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeMemberRoleRequest {
    pub role: BuiltInRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferOwnershipRequest {
    pub membership_id: Uuid,
}
