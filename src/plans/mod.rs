//! Subscription plans: static resource ceilings, live usage, and the gate
//! that refuses creations past the ceiling.

mod gate;
mod usage;

pub use gate::{check_resource_limit, enforce_resource_limit, insert_domain_gated, insert_membership_gated};
pub use usage::{organization_usage, usage_report};

use crate::models::plan::{Limit, LimitedResource, Plan};

/// Static ceiling on the number of `resource` rows an organization on `plan`
/// may hold.
pub fn plan_resource_limit(plan: Plan, resource: LimitedResource) -> Limit {
    match (plan, resource) {
        (Plan::Free, LimitedResource::Members) => Limit::Finite(3),
        (Plan::Free, LimitedResource::Domains) => Limit::Finite(1),
        (Plan::Starter, LimitedResource::Members) => Limit::Finite(10),
        (Plan::Starter, LimitedResource::Domains) => Limit::Finite(3),
        (Plan::Pro, LimitedResource::Members) => Limit::Finite(25),
        (Plan::Pro, LimitedResource::Domains) => Limit::Finite(10),
        (Plan::Enterprise, _) => Limit::Unlimited,
    }
}
