use uuid::Uuid;

use crate::authz::{require_member, require_owner};
use crate::errors::{AppError, AppResult};
use crate::models::membership::{BuiltInRole, Membership};
use crate::models::organization::{BillingUpdate, Organization};
use crate::models::plan::{Plan, UsageReport};
use crate::plans::usage_report;
use crate::store::Store;
use crate::utils::{is_valid_slug, slugify, utc_now};

/// Creates an organization on the FREE plan with `user_id` as its owner.
pub async fn create_organization<S: Store + ?Sized>(
    store: &S,
    user_id: Uuid,
    name: &str,
    slug: Option<&str>,
) -> AppResult<Organization> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("organization name must not be empty"));
    }

    let slug = match slug.map(str::trim) {
        Some(slug) if !is_valid_slug(slug) => {
            return Err(AppError::bad_request("slug may only contain lowercase letters, digits and dashes"))
        }
        Some(slug) => slug.to_string(),
        None => slugify(name),
    };
    if slug.is_empty() {
        return Err(AppError::bad_request("cannot derive a slug from the organization name"));
    }

    let now = utc_now();
    let organization = Organization {
        id: Uuid::new_v4(),
        slug,
        name: name.to_string(),
        plan: Plan::default(),
        billing_customer_id: None,
        billing_subscription_id: None,
        created_at: now,
        updated_at: now,
    };
    let owner = Membership::new(organization.id, user_id, BuiltInRole::Owner);

    store.insert_organization(&organization, &owner).await?;

    tracing::info!(organization_id = %organization.id, slug = %organization.slug, %user_id, "organization created");
    Ok(organization)
}

pub async fn get_organization<S: Store + ?Sized>(store: &S, user_id: Uuid, organization_id: Uuid) -> AppResult<Organization> {
    require_member(store, user_id, organization_id).await?;
    store
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("organization not found"))
}

pub async fn list_organizations<S: Store + ?Sized>(store: &S, user_id: Uuid) -> AppResult<Vec<Organization>> {
    store.list_organizations_for_user(user_id).await
}

/// Records a plan change from the billing flow. Gates read the plan on
/// every check, so the new limits apply to the next request.
pub async fn update_billing<S: Store + ?Sized>(
    store: &S,
    organization_id: Uuid,
    billing: &BillingUpdate,
) -> AppResult<Organization> {
    let organization = store
        .update_billing(organization_id, billing)
        .await?
        .ok_or_else(|| AppError::not_found("organization not found"))?;

    tracing::info!(%organization_id, plan = %organization.plan, "plan updated");
    Ok(organization)
}

pub async fn delete_organization<S: Store + ?Sized>(store: &S, user_id: Uuid, organization_id: Uuid) -> AppResult<Organization> {
    require_owner(store, user_id, organization_id).await?;
    let organization = store
        .find_organization(organization_id)
        .await?
        .ok_or_else(|| AppError::not_found("organization not found"))?;

    if !store.delete_organization(organization_id).await? {
        return Err(AppError::not_found("organization not found"));
    }

    tracing::info!(%organization_id, "organization deleted");
    Ok(organization)
}

pub async fn organization_usage<S: Store + ?Sized>(store: &S, user_id: Uuid, organization_id: Uuid) -> AppResult<UsageReport> {
    let organization = get_organization(store, user_id, organization_id).await?;
    usage_report(store, &organization).await
}
