use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get},
    Json, Router,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::domain::{CreateDomainRequest, Domain};
use crate::services::domains;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:org_id/domains", get(list_domains).post(create_domain))
        .route("/:org_id/domains/:domain_id", delete(delete_domain))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/domains",
    tag = "Domains",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Domains", body = Vec<Domain>),
        (status = 403, description = "Missing domains:read")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_domains(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(org_id): Path<Uuid>,
) -> AppResult<Json<Vec<Domain>>> {
    Ok(Json(domains::list_domains(&state.store, auth.user_id, org_id).await?))
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/domains",
    tag = "Domains",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = CreateDomainRequest,
    responses(
        (status = 201, description = "Domain created", body = Domain),
        (status = 402, description = "Domain limit of the plan reached"),
        (status = 403, description = "Missing domains:create"),
        (status = 409, description = "Hostname already registered")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_domain(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateDomainRequest>,
) -> AppResult<(StatusCode, Json<Domain>)> {
    let domain = domains::create_domain(&state.store, auth.user_id, org_id, &req.hostname).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &domain,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(domain)))
}

#[utoipa::path(
    delete,
    path = "/organizations/{org_id}/domains/{domain_id}",
    tag = "Domains",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("domain_id" = Uuid, Path, description = "Domain ID")
    ),
    responses(
        (status = 204, description = "Domain deleted"),
        (status = 403, description = "Missing domains:delete"),
        (status = 404, description = "Domain not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_domain(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((org_id, domain_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let domain = domains::delete_domain(&state.store, auth.user_id, org_id, domain_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &domain,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
