//! Billing provider webhook. The only HTTP path that writes an
//! organization's plan; authenticated by a shared secret, not a user token.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::put,
    Json, Router,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::config::BILLING_SECRET_HEADER;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::models::organization::{BillingUpdate, Organization};
use crate::services::organizations;
use crate::store::OrganizationRepository;

pub fn routes() -> Router<AppState> {
    Router::new().route("/organizations/:org_id", put(update_billing))
}

/// Plan change as reported by the billing provider.
#[utoipa::path(
    put,
    path = "/billing/organizations/{org_id}",
    tag = "Billing",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("x-billing-secret" = String, Header, description = "Shared billing webhook secret")
    ),
    request_body = BillingUpdate,
    responses(
        (status = 200, description = "Billing updated", body = Organization),
        (status = 401, description = "Missing or invalid billing secret"),
        (status = 404, description = "Organization not found")
    )
)]
pub async fn update_billing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(billing): Json<BillingUpdate>,
) -> AppResult<Json<Organization>> {
    let presented = headers.get(BILLING_SECRET_HEADER).and_then(|v| v.to_str().ok());
    if let Err(err) = state.billing.verify(presented) {
        tracing::warn!(organization_id = %org_id, "billing webhook rejected");
        return Err(err);
    }

    let old = state
        .store
        .find_organization(org_id)
        .await?
        .ok_or_else(|| AppError::not_found("organization not found"))?;

    let organization = organizations::update_billing(&state.store, org_id, &billing).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        None,
        &organization,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(organization))
}
