use uuid::Uuid;

use crate::authz::{require_member, require_owner};
use crate::errors::{AppError, AppResult};
use crate::models::membership::Membership;
use crate::models::rbac::{normalize_grants, CustomRole, Grant, Permission, RoleDetail};
use crate::store::Store;
use crate::utils::utc_now;

fn validate(name: &str, permissions: Vec<Grant>) -> AppResult<(String, Vec<Grant>)> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("role name must not be empty"));
    }
    Ok((name.to_string(), normalize_grants(permissions)))
}

async fn detail<S: Store + ?Sized>(store: &S, role: CustomRole) -> AppResult<RoleDetail> {
    let grants = store.role_permissions(role.id).await?;
    Ok(RoleDetail::new(role, grants.iter().map(Permission::grant).collect()))
}

async fn find_role<S: Store + ?Sized>(store: &S, organization_id: Uuid, role_id: Uuid) -> AppResult<CustomRole> {
    store
        .find_role(organization_id, role_id)
        .await?
        .ok_or_else(|| AppError::not_found("role not found"))
}

pub async fn create_role<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    name: &str,
    permissions: Vec<Grant>,
) -> AppResult<RoleDetail> {
    require_owner(store, actor_id, organization_id).await?;
    let (name, grants) = validate(name, permissions)?;

    let now = utc_now();
    let role = CustomRole {
        id: Uuid::new_v4(),
        organization_id,
        name,
        created_at: now,
        updated_at: now,
    };
    store.insert_role(&role, &grants).await?;

    tracing::info!(%organization_id, role_id = %role.id, grants = grants.len(), "role created");
    Ok(RoleDetail::new(role, grants))
}

/// Renames the role and replaces its whole permission set. Members linked
/// to the role see the new set immediately.
pub async fn update_role<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    role_id: Uuid,
    name: &str,
    permissions: Vec<Grant>,
) -> AppResult<RoleDetail> {
    require_owner(store, actor_id, organization_id).await?;
    let (name, grants) = validate(name, permissions)?;

    let existing = find_role(store, organization_id, role_id).await?;
    let role = CustomRole {
        name,
        updated_at: utc_now(),
        ..existing
    };
    store.replace_role(&role, &grants).await?;

    tracing::info!(%organization_id, %role_id, grants = grants.len(), "role replaced");
    detail(store, role).await
}

/// Deletes the role and revokes every permission members received from it.
pub async fn delete_role<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    role_id: Uuid,
) -> AppResult<CustomRole> {
    require_owner(store, actor_id, organization_id).await?;
    let role = find_role(store, organization_id, role_id).await?;

    if !store.delete_role(organization_id, role_id).await? {
        return Err(AppError::not_found("role not found"));
    }

    tracing::info!(%organization_id, %role_id, "role deleted");
    Ok(role)
}

/// Replaces the member's permissions with a copy of the role's grants, or
/// clears them when `role_id` is `None`.
pub async fn assign_role<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    membership_id: Uuid,
    role_id: Option<Uuid>,
) -> AppResult<Membership> {
    require_owner(store, actor_id, organization_id).await?;

    let membership = store
        .find_membership_by_id(organization_id, membership_id)
        .await?
        .ok_or_else(|| AppError::not_found("membership not found"))?;
    if let Some(role_id) = role_id {
        find_role(store, organization_id, role_id).await?;
    }

    store.assign_role(&membership, role_id).await?;

    tracing::info!(%organization_id, %membership_id, role_id = ?role_id, "role assigned");
    Ok(Membership {
        custom_role_id: role_id,
        ..membership
    })
}

pub async fn list_roles<S: Store + ?Sized>(store: &S, actor_id: Uuid, organization_id: Uuid) -> AppResult<Vec<RoleDetail>> {
    require_member(store, actor_id, organization_id).await?;

    let mut details = Vec::new();
    for role in store.list_roles(organization_id).await? {
        details.push(detail(store, role).await?);
    }
    Ok(details)
}

pub async fn get_role<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    role_id: Uuid,
) -> AppResult<RoleDetail> {
    require_member(store, actor_id, organization_id).await?;
    let role = find_role(store, organization_id, role_id).await?;
    detail(store, role).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rbac::{Action, Resource};

    #[test]
    fn blank_names_are_rejected() {
        let err = validate("   ", vec![]).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn names_are_trimmed_and_grants_normalized() {
        let (name, grants) = validate(
            " Editor ",
            vec![
                Grant::new(Resource::Domains, [Action::Read]),
                Grant::new(Resource::Domains, [Action::Update]),
            ],
        )
        .unwrap();

        assert_eq!(name, "Editor");
        assert_eq!(grants, vec![Grant::new(Resource::Domains, [Action::Read, Action::Update])]);
    }
}
