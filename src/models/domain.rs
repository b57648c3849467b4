use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Domain {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub hostname: String,
    pub created_at: DateTime<Utc>,
}

impl Loggable for Domain {
    fn entity_type() -> &'static str { "domain" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDomainRequest {
    #[schema(example = "listings.harbor-realty.com")]
    pub hostname: String,
}
