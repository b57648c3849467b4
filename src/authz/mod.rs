//! Authorization: who may do what inside an organization.
//!
//! - Owners bypass every granular check
//! - Everyone else needs an explicit (resource, action) grant, either
//!   attached to the user or to the custom role linked to their membership
//! - Storage failures deny

mod evaluator;
mod principal;

pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use principal::Principal;

use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::membership::Membership;
use crate::models::rbac::{Action, Resource};
use crate::store::Store;

/// Decides whether `user_id` may perform `action` on `resource` in
/// `organization_id`. Never errors: a missing membership or a storage
/// failure both yield `false`.
pub async fn check_permission<S: Store + ?Sized>(
    store: &S,
    user_id: Uuid,
    organization_id: Uuid,
    resource: Resource,
    action: Action,
) -> bool {
    check_permission_with(store, &DefaultPolicyEvaluator, user_id, organization_id, resource, action).await
}

pub async fn check_permission_with<S, E>(
    store: &S,
    evaluator: &E,
    user_id: Uuid,
    organization_id: Uuid,
    resource: Resource,
    action: Action,
) -> bool
where
    S: Store + ?Sized,
    E: PolicyEvaluator + ?Sized,
{
    match Principal::load(store, user_id, organization_id).await {
        Ok(Some(principal)) => evaluator.can(&principal, resource, action).await,
        Ok(None) => {
            tracing::debug!(%user_id, %organization_id, "no membership, denying");
            false
        }
        Err(err) => {
            tracing::warn!(
                %user_id,
                %organization_id,
                %resource,
                %action,
                error = %err,
                "permission lookup failed, denying"
            );
            false
        }
    }
}

/// Resolves the caller's membership. Organizations the caller does not
/// belong to are reported as not found.
pub async fn require_member<S: Store + ?Sized>(store: &S, user_id: Uuid, organization_id: Uuid) -> AppResult<Membership> {
    store
        .find_membership(organization_id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("organization not found"))
}

pub async fn require_owner<S: Store + ?Sized>(store: &S, user_id: Uuid, organization_id: Uuid) -> AppResult<Membership> {
    let membership = require_member(store, user_id, organization_id).await?;
    if !membership.role.is_owner() {
        return Err(AppError::forbidden("only the organization owner can do this"));
    }
    Ok(membership)
}

pub async fn require_permission<S: Store + ?Sized>(
    store: &S,
    user_id: Uuid,
    organization_id: Uuid,
    resource: Resource,
    action: Action,
) -> AppResult<Membership> {
    let membership = require_member(store, user_id, organization_id).await?;
    if !check_permission(store, user_id, organization_id, resource, action).await {
        return Err(AppError::forbidden(format!("missing permission {resource}:{action}")));
    }
    Ok(membership)
}
