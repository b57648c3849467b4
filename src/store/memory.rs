//! In-process store used by tests and local experiments.
//!
//! Each operation takes a single lock, so multi-row writes and the
//! conditional inserts are atomic with respect to each other.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::domain::Domain;
use crate::models::membership::{BuiltInRole, Membership};
use crate::models::organization::{BillingUpdate, Organization};
use crate::models::plan::Limit;
use crate::models::rbac::{CustomRole, Grant, Permission, PermissionSubject, Resource};
use crate::models::user::DbUser;

use super::{
    DomainRepository, MembershipRepository, OrganizationRepository, PermissionRepository, RoleRepository,
    UserRepository,
};

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, DbUser>,
    organizations: HashMap<Uuid, Organization>,
    memberships: HashMap<Uuid, Membership>,
    roles: HashMap<Uuid, CustomRole>,
    permissions: Vec<Permission>,
    domains: HashMap<Uuid, Domain>,
}

impl State {
    fn role_grants(&self, role_id: Uuid) -> Vec<Grant> {
        let mut grants: Vec<Grant> = self
            .permissions
            .iter()
            .filter(|p| p.subject == PermissionSubject::Role { role_id })
            .map(Permission::grant)
            .collect();
        grants.sort_by_key(|g| g.resource);
        grants
    }

    fn is_user_row(permission: &Permission, organization_id: Uuid, user_id: Uuid) -> bool {
        permission.organization_id == organization_id
            && matches!(permission.subject, PermissionSubject::User { user_id: u, .. } if u == user_id)
    }

    fn holds_resource(&self, organization_id: Uuid, user_id: Uuid, resource: Resource) -> bool {
        self.permissions
            .iter()
            .any(|p| Self::is_user_row(p, organization_id, user_id) && p.resource == resource)
    }

    /// Copies `grants` onto the user, skipping resources the user already holds.
    fn copy_grants(&mut self, organization_id: Uuid, user_id: Uuid, role_id: Uuid, grants: &[Grant]) {
        let now = Utc::now();
        for grant in grants {
            if self.holds_resource(organization_id, user_id, grant.resource) {
                continue;
            }
            self.permissions.push(Permission {
                id: Uuid::new_v4(),
                organization_id,
                resource: grant.resource,
                actions: grant.actions.clone(),
                subject: PermissionSubject::User {
                    user_id,
                    source_role_id: Some(role_id),
                },
                created_at: now,
            });
        }
    }

    fn drop_copies_of(&mut self, role_id: Uuid) {
        self.permissions.retain(|p| {
            !matches!(p.subject, PermissionSubject::User { source_role_id: Some(source), .. } if source == role_id)
        });
    }

    fn push_role_grants(&mut self, role: &CustomRole, grants: &[Grant]) {
        let now = Utc::now();
        for grant in grants {
            self.permissions.push(Permission {
                id: Uuid::new_v4(),
                organization_id: role.organization_id,
                resource: grant.resource,
                actions: grant.actions.clone(),
                subject: PermissionSubject::Role { role_id: role.id },
                created_at: now,
            });
        }
    }

    /// Mirrors the (role, resource) unique index: the whole write is refused
    /// before anything changes.
    fn check_distinct(grants: &[Grant]) -> AppResult<()> {
        let mut seen = HashSet::new();
        match grants.iter().find(|g| !seen.insert(g.resource)) {
            Some(grant) => Err(AppError::conflict(format!("duplicate grant for {}", grant.resource))),
            None => Ok(()),
        }
    }

    fn role_name_taken(&self, role: &CustomRole) -> bool {
        self.roles
            .values()
            .any(|r| r.organization_id == role.organization_id && r.id != role.id && r.name == role.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails as if the backing database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::internal("store unavailable"));
        }
        self.state
            .lock()
            .map_err(|_| AppError::internal("store lock poisoned"))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert_user(&self, user: &DbUser) -> AppResult<()> {
        let mut state = self.lock()?;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::conflict("email already in use"));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<DbUser>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<DbUser>> {
        Ok(self.lock()?.users.values().find(|u| u.email == email).cloned())
    }
}

#[async_trait]
impl OrganizationRepository for MemoryStore {
    async fn insert_organization(&self, organization: &Organization, owner: &Membership) -> AppResult<()> {
        let mut state = self.lock()?;
        if state.organizations.values().any(|o| o.slug == organization.slug) {
            return Err(AppError::conflict("organization slug already in use"));
        }
        if !state.users.contains_key(&owner.user_id) {
            return Err(AppError::not_found("user not found"));
        }
        state.organizations.insert(organization.id, organization.clone());
        state.memberships.insert(owner.id, owner.clone());
        Ok(())
    }

    async fn find_organization(&self, id: Uuid) -> AppResult<Option<Organization>> {
        Ok(self.lock()?.organizations.get(&id).cloned())
    }

    async fn find_organization_by_slug(&self, slug: &str) -> AppResult<Option<Organization>> {
        Ok(self.lock()?.organizations.values().find(|o| o.slug == slug).cloned())
    }

    async fn list_organizations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Organization>> {
        let state = self.lock()?;
        let mut organizations: Vec<Organization> = state
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| state.organizations.get(&m.organization_id).cloned())
            .collect();
        organizations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(organizations)
    }

    async fn update_billing(&self, id: Uuid, billing: &BillingUpdate) -> AppResult<Option<Organization>> {
        let mut state = self.lock()?;
        let Some(organization) = state.organizations.get_mut(&id) else {
            return Ok(None);
        };
        organization.plan = billing.plan;
        organization.billing_customer_id = billing.billing_customer_id.clone();
        organization.billing_subscription_id = billing.billing_subscription_id.clone();
        organization.updated_at = Utc::now();
        Ok(Some(organization.clone()))
    }

    async fn delete_organization(&self, id: Uuid) -> AppResult<bool> {
        let mut state = self.lock()?;
        if state.organizations.remove(&id).is_none() {
            return Ok(false);
        }
        state.memberships.retain(|_, m| m.organization_id != id);
        state.roles.retain(|_, r| r.organization_id != id);
        state.permissions.retain(|p| p.organization_id != id);
        state.domains.retain(|_, d| d.organization_id != id);
        Ok(true)
    }
}

#[async_trait]
impl MembershipRepository for MemoryStore {
    async fn find_membership(&self, organization_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>> {
        Ok(self
            .lock()?
            .memberships
            .values()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .cloned())
    }

    async fn find_membership_by_id(&self, organization_id: Uuid, membership_id: Uuid) -> AppResult<Option<Membership>> {
        Ok(self
            .lock()?
            .memberships
            .get(&membership_id)
            .filter(|m| m.organization_id == organization_id)
            .cloned())
    }

    async fn list_memberships(&self, organization_id: Uuid) -> AppResult<Vec<Membership>> {
        let state = self.lock()?;
        let mut memberships: Vec<Membership> = state
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.created_at);
        Ok(memberships)
    }

    async fn count_memberships(&self, organization_id: Uuid) -> AppResult<u64> {
        Ok(self
            .lock()?
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .count() as u64)
    }

    async fn insert_membership_within(&self, membership: &Membership, limit: Limit) -> AppResult<bool> {
        let mut state = self.lock()?;
        let existing: Vec<&Membership> = state
            .memberships
            .values()
            .filter(|m| m.organization_id == membership.organization_id)
            .collect();
        if existing.iter().any(|m| m.user_id == membership.user_id) {
            return Err(AppError::conflict("user is already a member"));
        }
        if membership.role.is_owner() && existing.iter().any(|m| m.role.is_owner()) {
            return Err(AppError::conflict("organization already has an owner"));
        }
        if !limit.allows(existing.len() as u64) {
            return Ok(false);
        }
        state.memberships.insert(membership.id, membership.clone());
        Ok(true)
    }

    async fn set_member_role(&self, membership_id: Uuid, role: BuiltInRole) -> AppResult<()> {
        let mut state = self.lock()?;
        let membership = state
            .memberships
            .get_mut(&membership_id)
            .ok_or_else(|| AppError::not_found("membership not found"))?;
        membership.role = role;
        Ok(())
    }

    async fn transfer_ownership(&self, organization_id: Uuid, from: Uuid, to: Uuid) -> AppResult<()> {
        let mut state = self.lock()?;
        let in_org = |m: Option<&Membership>| m.map(|m| m.organization_id == organization_id).unwrap_or(false);
        if !in_org(state.memberships.get(&from)) || !in_org(state.memberships.get(&to)) {
            return Err(AppError::not_found("membership not found"));
        }
        if let Some(previous) = state.memberships.get_mut(&from) {
            previous.role = BuiltInRole::Admin;
        }
        if let Some(next) = state.memberships.get_mut(&to) {
            next.role = BuiltInRole::Owner;
        }
        Ok(())
    }

    async fn delete_membership(&self, membership: &Membership) -> AppResult<()> {
        let mut state = self.lock()?;
        state.memberships.remove(&membership.id);
        state
            .permissions
            .retain(|p| !State::is_user_row(p, membership.organization_id, membership.user_id));
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn insert_role(&self, role: &CustomRole, grants: &[Grant]) -> AppResult<()> {
        let mut state = self.lock()?;
        if state.role_name_taken(role) {
            return Err(AppError::conflict("role name already exists"));
        }
        State::check_distinct(grants)?;
        state.roles.insert(role.id, role.clone());
        state.push_role_grants(role, grants);
        Ok(())
    }

    async fn find_role(&self, organization_id: Uuid, role_id: Uuid) -> AppResult<Option<CustomRole>> {
        Ok(self
            .lock()?
            .roles
            .get(&role_id)
            .filter(|r| r.organization_id == organization_id)
            .cloned())
    }

    async fn list_roles(&self, organization_id: Uuid) -> AppResult<Vec<CustomRole>> {
        let state = self.lock()?;
        let mut roles: Vec<CustomRole> = state
            .roles
            .values()
            .filter(|r| r.organization_id == organization_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn role_permissions(&self, role_id: Uuid) -> AppResult<Vec<Permission>> {
        let state = self.lock()?;
        let mut permissions: Vec<Permission> = state
            .permissions
            .iter()
            .filter(|p| p.subject == PermissionSubject::Role { role_id })
            .cloned()
            .collect();
        permissions.sort_by_key(|p| p.resource);
        Ok(permissions)
    }

    async fn replace_role(&self, role: &CustomRole, grants: &[Grant]) -> AppResult<()> {
        let mut state = self.lock()?;
        if !state.roles.contains_key(&role.id) {
            return Err(AppError::not_found("role not found"));
        }
        if state.role_name_taken(role) {
            return Err(AppError::conflict("role name already exists"));
        }
        State::check_distinct(grants)?;
        state.roles.insert(role.id, role.clone());
        state
            .permissions
            .retain(|p| p.subject != PermissionSubject::Role { role_id: role.id });
        state.push_role_grants(role, grants);

        state.drop_copies_of(role.id);
        let linked: Vec<Uuid> = state
            .memberships
            .values()
            .filter(|m| m.custom_role_id == Some(role.id))
            .map(|m| m.user_id)
            .collect();
        for user_id in linked {
            state.copy_grants(role.organization_id, user_id, role.id, grants);
        }
        Ok(())
    }

    async fn delete_role(&self, organization_id: Uuid, role_id: Uuid) -> AppResult<bool> {
        let mut state = self.lock()?;
        match state.roles.get(&role_id) {
            Some(role) if role.organization_id == organization_id => {}
            _ => return Ok(false),
        }
        state.roles.remove(&role_id);
        state
            .permissions
            .retain(|p| p.subject != PermissionSubject::Role { role_id });
        state.drop_copies_of(role_id);
        for membership in state.memberships.values_mut() {
            if membership.custom_role_id == Some(role_id) {
                membership.custom_role_id = None;
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl PermissionRepository for MemoryStore {
    async fn user_permissions(&self, organization_id: Uuid, user_id: Uuid) -> AppResult<Vec<Permission>> {
        let state = self.lock()?;
        let mut permissions: Vec<Permission> = state
            .permissions
            .iter()
            .filter(|p| State::is_user_row(p, organization_id, user_id))
            .cloned()
            .collect();
        permissions.sort_by_key(|p| p.resource);
        Ok(permissions)
    }

    async fn assign_role(&self, membership: &Membership, role_id: Option<Uuid>) -> AppResult<()> {
        let mut state = self.lock()?;
        let grants = match role_id {
            Some(role_id) => {
                let in_org = state
                    .roles
                    .get(&role_id)
                    .map(|r| r.organization_id == membership.organization_id)
                    .unwrap_or(false);
                if !in_org {
                    return Err(AppError::not_found("role not found"));
                }
                state.role_grants(role_id)
            }
            None => Vec::new(),
        };

        let stored = state
            .memberships
            .get_mut(&membership.id)
            .ok_or_else(|| AppError::not_found("membership not found"))?;
        stored.custom_role_id = role_id;

        state
            .permissions
            .retain(|p| !State::is_user_row(p, membership.organization_id, membership.user_id));
        if let Some(role_id) = role_id {
            state.copy_grants(membership.organization_id, membership.user_id, role_id, &grants);
        }
        Ok(())
    }

    async fn upsert_user_permission(&self, organization_id: Uuid, user_id: Uuid, grant: &Grant) -> AppResult<Permission> {
        let mut state = self.lock()?;
        let subject = PermissionSubject::User {
            user_id,
            source_role_id: None,
        };
        if let Some(existing) = state
            .permissions
            .iter_mut()
            .find(|p| State::is_user_row(p, organization_id, user_id) && p.resource == grant.resource)
        {
            existing.actions = grant.actions.clone();
            existing.subject = subject;
            return Ok(existing.clone());
        }

        let permission = Permission {
            id: Uuid::new_v4(),
            organization_id,
            resource: grant.resource,
            actions: grant.actions.clone(),
            subject,
            created_at: Utc::now(),
        };
        state.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn delete_user_permission(&self, organization_id: Uuid, user_id: Uuid, resource: Resource) -> AppResult<bool> {
        let mut state = self.lock()?;
        let before = state.permissions.len();
        state
            .permissions
            .retain(|p| !(State::is_user_row(p, organization_id, user_id) && p.resource == resource));
        Ok(state.permissions.len() != before)
    }
}

#[async_trait]
impl DomainRepository for MemoryStore {
    async fn list_domains(&self, organization_id: Uuid) -> AppResult<Vec<Domain>> {
        let state = self.lock()?;
        let mut domains: Vec<Domain> = state
            .domains
            .values()
            .filter(|d| d.organization_id == organization_id)
            .cloned()
            .collect();
        domains.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(domains)
    }

    async fn count_domains(&self, organization_id: Uuid) -> AppResult<u64> {
        Ok(self
            .lock()?
            .domains
            .values()
            .filter(|d| d.organization_id == organization_id)
            .count() as u64)
    }

    async fn insert_domain_within(&self, domain: &Domain, limit: Limit) -> AppResult<bool> {
        let mut state = self.lock()?;
        if state.domains.values().any(|d| d.hostname == domain.hostname) {
            return Err(AppError::conflict("hostname already registered"));
        }
        let current = state
            .domains
            .values()
            .filter(|d| d.organization_id == domain.organization_id)
            .count() as u64;
        if !limit.allows(current) {
            return Ok(false);
        }
        state.domains.insert(domain.id, domain.clone());
        Ok(true)
    }

    async fn delete_domain(&self, organization_id: Uuid, domain_id: Uuid) -> AppResult<bool> {
        let mut state = self.lock()?;
        match state.domains.get(&domain_id) {
            Some(domain) if domain.organization_id == organization_id => {
                state.domains.remove(&domain_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
