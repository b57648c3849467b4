use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::membership::{BuiltInRole, Membership};
use crate::models::rbac::{Action, Grant, Permission, Resource};
use crate::store::Store;

/// A member as seen by the evaluator: their built-in role plus the grants
/// loaded for one organization.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub membership_id: Uuid,
    pub role: BuiltInRole,
    /// Rows attached to the user, including copies materialized from a role.
    pub direct: Vec<Grant>,
    /// Rows of the custom role linked to the membership.
    pub role_grants: Vec<Grant>,
}

impl Principal {
    pub fn from_membership(membership: &Membership) -> Self {
        Self {
            user_id: membership.user_id,
            organization_id: membership.organization_id,
            membership_id: membership.id,
            role: membership.role,
            direct: Vec::new(),
            role_grants: Vec::new(),
        }
    }

    pub fn with_direct(mut self, grants: impl IntoIterator<Item = Grant>) -> Self {
        self.direct = grants.into_iter().collect();
        self
    }

    pub fn with_role_grants(mut self, grants: impl IntoIterator<Item = Grant>) -> Self {
        self.role_grants = grants.into_iter().collect();
        self
    }

    pub fn is_owner(&self) -> bool {
        self.role.is_owner()
    }

    pub fn has_direct(&self, resource: Resource, action: Action) -> bool {
        self.direct.iter().any(|g| g.allows(resource, action))
    }

    pub fn has_role_grant(&self, resource: Resource, action: Action) -> bool {
        self.role_grants.iter().any(|g| g.allows(resource, action))
    }

    /// Loads the principal for `user_id` in `organization_id`.
    ///
    /// Returns `None` when the user is not a member; permission rows left
    /// behind for a non-member are never read.
    pub async fn load<S: Store + ?Sized>(store: &S, user_id: Uuid, organization_id: Uuid) -> AppResult<Option<Self>> {
        let Some(membership) = store.find_membership(organization_id, user_id).await? else {
            return Ok(None);
        };

        let mut principal = Self::from_membership(&membership);
        if principal.is_owner() {
            return Ok(Some(principal));
        }

        let direct = store.user_permissions(organization_id, user_id).await?;
        principal.direct = direct.iter().map(Permission::grant).collect();

        if let Some(role_id) = membership.custom_role_id {
            let role_rows = store.role_permissions(role_id).await?;
            principal.role_grants = role_rows.iter().map(Permission::grant).collect();
        }

        Ok(Some(principal))
    }
}
