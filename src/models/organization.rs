use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};
use crate::models::plan::Plan;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Organization {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub plan: Plan,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Organization {
    fn entity_type() -> &'static str { "organization" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrganizationRequest {
    #[schema(example = "Harbor Realty")]
    pub name: String,
    /// Derived from the name when omitted.
    #[schema(example = "harbor-realty")]
    pub slug: Option<String>,
}

/// Written by the billing flow after checkout or a subscription change.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BillingUpdate {
    pub plan: Plan,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
}
