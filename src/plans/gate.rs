use uuid::Uuid;

use super::plan_resource_limit;
use crate::errors::{AppError, AppResult};
use crate::models::domain::Domain;
use crate::models::membership::Membership;
use crate::models::plan::{Limit, LimitedResource, Plan};
use crate::store::Store;

async fn current_count<S: Store + ?Sized>(store: &S, organization_id: Uuid, resource: LimitedResource) -> AppResult<u64> {
    match resource {
        LimitedResource::Members => store.count_memberships(organization_id).await,
        LimitedResource::Domains => store.count_domains(organization_id).await,
    }
}

async fn fresh_plan<S: Store + ?Sized>(store: &S, organization_id: Uuid) -> AppResult<Plan> {
    store
        .find_organization(organization_id)
        .await?
        .map(|org| org.plan)
        .ok_or_else(|| AppError::not_found("organization not found"))
}

fn refuse(organization_id: Uuid, plan: Plan, resource: LimitedResource, limit: Limit) -> AppError {
    tracing::warn!(%organization_id, %plan, %resource, %limit, "plan limit reached");
    AppError::plan_restriction(resource, limit)
}

/// Refuses with `PlanRestriction` when the organization already holds as
/// many `resource` rows as `plan` allows. Returns the limit that applied.
pub async fn enforce_resource_limit<S: Store + ?Sized>(
    store: &S,
    organization_id: Uuid,
    plan: Plan,
    resource: LimitedResource,
) -> AppResult<Limit> {
    let limit = plan_resource_limit(plan, resource);
    if limit == Limit::Unlimited {
        return Ok(limit);
    }

    let current = current_count(store, organization_id, resource).await?;
    if !limit.allows(current) {
        return Err(refuse(organization_id, plan, resource, limit));
    }
    Ok(limit)
}

/// Advisory pre-check against the organization's current plan, for callers
/// that want to show an upgrade prompt before submitting. Any failure reads
/// as "not allowed".
pub async fn check_resource_limit<S: Store + ?Sized>(store: &S, organization_id: Uuid, resource: LimitedResource) -> bool {
    let plan = match fresh_plan(store, organization_id).await {
        Ok(plan) => plan,
        Err(err) => {
            tracing::warn!(%organization_id, %resource, error = %err, "limit check failed");
            return false;
        }
    };

    match enforce_resource_limit(store, organization_id, plan, resource).await {
        Ok(_) => true,
        Err(err) if err.is_plan_restriction() => false,
        Err(err) => {
            tracing::warn!(%organization_id, %resource, error = %err, "limit check failed");
            false
        }
    }
}

/// Adds a membership if the organization's plan has room. The count and the
/// insert happen as one store operation, so concurrent invites cannot push
/// the organization past its limit.
pub async fn insert_membership_gated<S: Store + ?Sized>(store: &S, membership: &Membership) -> AppResult<()> {
    let organization_id = membership.organization_id;
    let plan = fresh_plan(store, organization_id).await?;
    let limit = enforce_resource_limit(store, organization_id, plan, LimitedResource::Members).await?;

    if !store.insert_membership_within(membership, limit).await? {
        return Err(refuse(organization_id, plan, LimitedResource::Members, limit));
    }
    Ok(())
}

pub async fn insert_domain_gated<S: Store + ?Sized>(store: &S, domain: &Domain) -> AppResult<()> {
    let organization_id = domain.organization_id;
    let plan = fresh_plan(store, organization_id).await?;
    let limit = enforce_resource_limit(store, organization_id, plan, LimitedResource::Domains).await?;

    if !store.insert_domain_within(domain, limit).await? {
        return Err(refuse(organization_id, plan, LimitedResource::Domains, limit));
    }
    Ok(())
}
