//! Storage interfaces consumed by the authorization core.
//!
//! Every operation is async and returns storage failures as `AppError`.
//! Methods that touch several rows are atomic: an implementation must either
//! apply all of the change or none of it. `SqliteStore` (see `crate::db`)
//! backs the service; `MemoryStore` backs unit and property tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::domain::Domain;
use crate::models::membership::{BuiltInRole, Membership};
use crate::models::organization::{BillingUpdate, Organization};
use crate::models::plan::Limit;
use crate::models::rbac::{CustomRole, Grant, Permission, Resource};
use crate::models::user::DbUser;

pub mod memory;

pub use memory::MemoryStore;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert_user(&self, user: &DbUser) -> AppResult<()>;
    async fn find_user(&self, id: Uuid) -> AppResult<Option<DbUser>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<DbUser>>;
}

#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Inserts the organization together with its owner membership.
    async fn insert_organization(&self, organization: &Organization, owner: &Membership) -> AppResult<()>;
    async fn find_organization(&self, id: Uuid) -> AppResult<Option<Organization>>;
    async fn find_organization_by_slug(&self, slug: &str) -> AppResult<Option<Organization>>;
    async fn list_organizations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Organization>>;
    async fn update_billing(&self, id: Uuid, billing: &BillingUpdate) -> AppResult<Option<Organization>>;
    /// Removes the organization and every row scoped to it.
    async fn delete_organization(&self, id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn find_membership(&self, organization_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>>;
    async fn find_membership_by_id(&self, organization_id: Uuid, membership_id: Uuid) -> AppResult<Option<Membership>>;
    async fn list_memberships(&self, organization_id: Uuid) -> AppResult<Vec<Membership>>;
    async fn count_memberships(&self, organization_id: Uuid) -> AppResult<u64>;
    /// Inserts unless the organization already holds `limit` memberships.
    /// Returns `false` when refused. Check and insert are one atomic step.
    async fn insert_membership_within(&self, membership: &Membership, limit: Limit) -> AppResult<bool>;
    async fn set_member_role(&self, membership_id: Uuid, role: BuiltInRole) -> AppResult<()>;
    /// Demotes `from` to ADMIN and promotes `to` to OWNER.
    async fn transfer_ownership(&self, organization_id: Uuid, from: Uuid, to: Uuid) -> AppResult<()>;
    /// Deletes the membership and the user's permission rows in its organization.
    async fn delete_membership(&self, membership: &Membership) -> AppResult<()>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Inserts the role and its grants.
    async fn insert_role(&self, role: &CustomRole, grants: &[Grant]) -> AppResult<()>;
    async fn find_role(&self, organization_id: Uuid, role_id: Uuid) -> AppResult<Option<CustomRole>>;
    async fn list_roles(&self, organization_id: Uuid) -> AppResult<Vec<CustomRole>>;
    async fn role_permissions(&self, role_id: Uuid) -> AppResult<Vec<Permission>>;
    /// Renames the role, replaces its grants wholesale, and re-materializes
    /// the new grants onto every member linked to it.
    async fn replace_role(&self, role: &CustomRole, grants: &[Grant]) -> AppResult<()>;
    /// Deletes the role, its grants, every permission copied from it, and
    /// unlinks members.
    async fn delete_role(&self, organization_id: Uuid, role_id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// Direct permission rows of a user in one organization.
    async fn user_permissions(&self, organization_id: Uuid, user_id: Uuid) -> AppResult<Vec<Permission>>;
    /// Replaces the member's permission rows with copies of the role's
    /// grants (or none) and records the role link.
    async fn assign_role(&self, membership: &Membership, role_id: Option<Uuid>) -> AppResult<()>;
    /// Creates or replaces the (user, resource) grant.
    async fn upsert_user_permission(&self, organization_id: Uuid, user_id: Uuid, grant: &Grant) -> AppResult<Permission>;
    async fn delete_user_permission(&self, organization_id: Uuid, user_id: Uuid, resource: Resource) -> AppResult<bool>;
}

#[async_trait]
pub trait DomainRepository: Send + Sync {
    async fn list_domains(&self, organization_id: Uuid) -> AppResult<Vec<Domain>>;
    async fn count_domains(&self, organization_id: Uuid) -> AppResult<u64>;
    /// Inserts unless the organization already holds `limit` domains.
    /// Returns `false` when refused. Check and insert are one atomic step.
    async fn insert_domain_within(&self, domain: &Domain, limit: Limit) -> AppResult<bool>;
    async fn delete_domain(&self, organization_id: Uuid, domain_id: Uuid) -> AppResult<bool>;
}

/// Everything the services need from storage.
pub trait Store:
    UserRepository + OrganizationRepository + MembershipRepository + RoleRepository + PermissionRepository + DomainRepository
{
}

impl<T> Store for T where
    T: UserRepository + OrganizationRepository + MembershipRepository + RoleRepository + PermissionRepository + DomainRepository
{
}
