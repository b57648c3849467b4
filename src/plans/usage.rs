use uuid::Uuid;

use super::plan_resource_limit;
use crate::errors::AppResult;
use crate::models::organization::Organization;
use crate::models::plan::{LimitedResource, Usage, UsageReport};
use crate::store::Store;

/// Live member and domain counts. The two counts are independent reads and
/// run concurrently.
pub async fn organization_usage<S: Store + ?Sized>(store: &S, organization_id: Uuid) -> AppResult<Usage> {
    let (members, domains) = tokio::try_join!(
        store.count_memberships(organization_id),
        store.count_domains(organization_id),
    )?;

    Ok(Usage { members, domains })
}

pub async fn usage_report<S: Store + ?Sized>(store: &S, organization: &Organization) -> AppResult<UsageReport> {
    let usage = organization_usage(store, organization.id).await?;

    Ok(UsageReport {
        plan: organization.plan,
        usage,
        member_limit: plan_resource_limit(organization.plan, LimitedResource::Members).finite(),
        domain_limit: plan_resource_limit(organization.plan, LimitedResource::Domains).finite(),
    })
}
