use std::collections::BTreeSet;

use uuid::Uuid;

use crate::authz::{require_member, require_owner, require_permission};
use crate::errors::{AppError, AppResult};
use crate::models::membership::{BuiltInRole, Membership};
use crate::models::rbac::{
    Action, EffectivePermission, EffectivePermissions, Grant, Permission, PermissionSubject, Resource,
};
use crate::plans::insert_membership_gated;
use crate::store::Store;

async fn find_membership<S: Store + ?Sized>(store: &S, organization_id: Uuid, membership_id: Uuid) -> AppResult<Membership> {
    store
        .find_membership_by_id(organization_id, membership_id)
        .await?
        .ok_or_else(|| AppError::not_found("membership not found"))
}

/// Adds an existing user to the organization. New members hold no granular
/// permissions until a role or grant is assigned.
pub async fn add_member<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    email: &str,
    role: Option<BuiltInRole>,
) -> AppResult<Membership> {
    require_permission(store, actor_id, organization_id, Resource::Team, Action::Create).await?;

    let role = role.unwrap_or(BuiltInRole::Member);
    if role.is_owner() {
        return Err(AppError::bad_request("an organization has exactly one owner; transfer ownership instead"));
    }

    let user = store
        .find_user_by_email(&email.trim().to_ascii_lowercase())
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    if store.find_membership(organization_id, user.id).await?.is_some() {
        return Err(AppError::conflict("user is already a member"));
    }

    let membership = Membership::new(organization_id, user.id, role);
    insert_membership_gated(store, &membership).await?;

    tracing::info!(%organization_id, user_id = %user.id, %role, "member added");
    Ok(membership)
}

pub async fn list_members<S: Store + ?Sized>(store: &S, actor_id: Uuid, organization_id: Uuid) -> AppResult<Vec<Membership>> {
    require_permission(store, actor_id, organization_id, Resource::Team, Action::Read).await?;
    store.list_memberships(organization_id).await
}

/// Changes a non-owner's built-in role. Ownership only moves through
/// `transfer_ownership`.
pub async fn change_member_role<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    membership_id: Uuid,
    role: BuiltInRole,
) -> AppResult<Membership> {
    require_owner(store, actor_id, organization_id).await?;

    if role.is_owner() {
        return Err(AppError::bad_request("use ownership transfer to make a member the owner"));
    }
    let membership = find_membership(store, organization_id, membership_id).await?;
    if membership.role.is_owner() {
        return Err(AppError::conflict("the owner cannot be demoted; transfer ownership first"));
    }

    store.set_member_role(membership.id, role).await?;
    Ok(Membership { role, ..membership })
}

/// Hands ownership to another member; the previous owner becomes ADMIN.
pub async fn transfer_ownership<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    membership_id: Uuid,
) -> AppResult<Membership> {
    let owner = require_owner(store, actor_id, organization_id).await?;
    let target = find_membership(store, organization_id, membership_id).await?;
    if target.id == owner.id {
        return Err(AppError::bad_request("member already owns the organization"));
    }

    store.transfer_ownership(organization_id, owner.id, target.id).await?;

    tracing::info!(%organization_id, from = %owner.user_id, to = %target.user_id, "ownership transferred");
    Ok(Membership {
        role: BuiltInRole::Owner,
        ..target
    })
}

pub async fn remove_member<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    membership_id: Uuid,
) -> AppResult<Membership> {
    require_permission(store, actor_id, organization_id, Resource::Team, Action::Delete).await?;

    let membership = find_membership(store, organization_id, membership_id).await?;
    if membership.role.is_owner() {
        return Err(AppError::conflict("the owner cannot be removed"));
    }

    store.delete_membership(&membership).await?;
    tracing::info!(%organization_id, user_id = %membership.user_id, "member removed");
    Ok(membership)
}

pub async fn leave_organization<S: Store + ?Sized>(store: &S, user_id: Uuid, organization_id: Uuid) -> AppResult<Membership> {
    let membership = require_member(store, user_id, organization_id).await?;
    if membership.role.is_owner() {
        return Err(AppError::conflict("the owner must transfer ownership before leaving"));
    }

    store.delete_membership(&membership).await?;
    Ok(membership)
}

/// Grants `actions` on `resource` directly to a member, replacing any grant
/// they already hold for that resource.
pub async fn grant_user_permission<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    membership_id: Uuid,
    resource: Resource,
    actions: BTreeSet<Action>,
) -> AppResult<Permission> {
    require_owner(store, actor_id, organization_id).await?;
    if actions.is_empty() {
        return Err(AppError::bad_request("at least one action is required"));
    }

    let membership = find_membership(store, organization_id, membership_id).await?;
    let grant = Grant { resource, actions };
    store.upsert_user_permission(organization_id, membership.user_id, &grant).await
}

pub async fn revoke_user_permission<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    membership_id: Uuid,
    resource: Resource,
) -> AppResult<Permission> {
    require_owner(store, actor_id, organization_id).await?;

    let membership = find_membership(store, organization_id, membership_id).await?;
    let permission = store
        .user_permissions(organization_id, membership.user_id)
        .await?
        .into_iter()
        .find(|p| p.resource == resource)
        .ok_or_else(|| AppError::not_found("permission not found"))?;

    if !store.delete_user_permission(organization_id, membership.user_id, resource).await? {
        return Err(AppError::not_found("permission not found"));
    }
    Ok(permission)
}

/// What `user_id` may do in the organization and where each grant comes
/// from. Members may read their own; the owner may read anyone's.
pub async fn effective_permissions<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    user_id: Uuid,
) -> AppResult<EffectivePermissions> {
    let actor = require_member(store, actor_id, organization_id).await?;
    if actor_id != user_id && !actor.role.is_owner() {
        return Err(AppError::forbidden("only the organization owner can inspect other members"));
    }

    let membership = store
        .find_membership(organization_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("membership not found"))?;

    let permissions = if membership.role.is_owner() {
        Resource::ALL
            .into_iter()
            .map(|resource| EffectivePermission {
                resource,
                actions: Action::ALL.into_iter().collect(),
                source: "owner".to_string(),
                role_id: None,
            })
            .collect()
    } else {
        let mut permissions: Vec<EffectivePermission> = store
            .user_permissions(organization_id, user_id)
            .await?
            .into_iter()
            .map(|p| match p.subject {
                PermissionSubject::User {
                    source_role_id: Some(role_id),
                    ..
                } => EffectivePermission {
                    resource: p.resource,
                    actions: p.actions,
                    source: "role".to_string(),
                    role_id: Some(role_id),
                },
                _ => EffectivePermission {
                    resource: p.resource,
                    actions: p.actions,
                    source: "direct".to_string(),
                    role_id: None,
                },
            })
            .collect();

        // A direct grant shadows the copy of the role grant for the same
        // resource; the role grant still counts at check time.
        if let Some(role_id) = membership.custom_role_id {
            for grant in store.role_permissions(role_id).await? {
                let covered = permissions
                    .iter()
                    .any(|p| p.resource == grant.resource && grant.actions.is_subset(&p.actions));
                if !covered {
                    permissions.push(EffectivePermission {
                        resource: grant.resource,
                        actions: grant.actions,
                        source: "role".to_string(),
                        role_id: Some(role_id),
                    });
                }
            }
        }
        permissions
    };

    Ok(EffectivePermissions {
        user_id,
        organization_id,
        role: membership.role,
        custom_role_id: membership.custom_role_id,
        permissions,
    })
}
