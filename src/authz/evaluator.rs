use async_trait::async_trait;

use super::principal::Principal;
use crate::models::rbac::{Action, Resource};

/// Policy evaluator trait for pluggable authorization logic
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Whether the principal may perform `action` on `resource`
    async fn can(&self, principal: &Principal, resource: Resource, action: Action) -> bool;
}

/// Default policy evaluator
///
/// Evaluation order, first match wins:
/// 1. OWNER membership -> allow
/// 2. direct user permission for the exact (resource, action) -> allow
/// 3. permission of the linked custom role -> allow
/// 4. deny
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicyEvaluator;

impl DefaultPolicyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEvaluator for DefaultPolicyEvaluator {
    async fn can(&self, principal: &Principal, resource: Resource, action: Action) -> bool {
        if principal.is_owner() {
            tracing::debug!(
                user_id = %principal.user_id,
                organization_id = %principal.organization_id,
                %resource,
                %action,
                "owner bypass"
            );
            return true;
        }

        if principal.has_direct(resource, action) {
            tracing::debug!(
                user_id = %principal.user_id,
                organization_id = %principal.organization_id,
                %resource,
                %action,
                "direct permission match"
            );
            return true;
        }

        if principal.has_role_grant(resource, action) {
            tracing::debug!(
                user_id = %principal.user_id,
                organization_id = %principal.organization_id,
                %resource,
                %action,
                "role permission match"
            );
            return true;
        }

        tracing::debug!(
            user_id = %principal.user_id,
            organization_id = %principal.organization_id,
            %resource,
            %action,
            "permission denied"
        );
        false
    }
}
