//! Organization lifecycle, usage and the permission check endpoint.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::check_permission;
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::organization::{CreateOrganizationRequest, Organization};
use crate::models::plan::{LimitCheckResponse, LimitedResource, UsageReport};
use crate::models::rbac::{CheckPermissionQuery, CheckPermissionResponse};
use crate::plans::{check_resource_limit, plan_resource_limit};
use crate::services::organizations;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_organizations).post(create_organization))
        .route("/:org_id", get(get_organization).delete(delete_organization))
        .route("/:org_id/usage", get(get_usage))
        .route("/:org_id/limits/:resource", get(check_limit))
        .route("/:org_id/check", get(check))
        .route("/:org_id/leave", post(super::members::leave))
}

#[utoipa::path(
    get,
    path = "/organizations",
    tag = "Organizations",
    responses((status = 200, description = "Organizations the caller belongs to", body = Vec<Organization>)),
    security(("bearerAuth" = []))
)]
pub async fn list_organizations(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Organization>>> {
    Ok(Json(organizations::list_organizations(&state.store, auth.user_id).await?))
}

#[utoipa::path(
    post,
    path = "/organizations",
    tag = "Organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created; caller is the owner", body = Organization),
        (status = 400, description = "Invalid name or slug"),
        (status = 409, description = "Slug already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<CreateOrganizationRequest>,
) -> AppResult<(StatusCode, Json<Organization>)> {
    let organization =
        organizations::create_organization(&state.store, auth.user_id, &req.name, req.slug.as_deref()).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &organization,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(organization)))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}",
    tag = "Organizations",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Organization", body = Organization),
        (status = 404, description = "Not found or not a member")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(org_id): Path<Uuid>,
) -> AppResult<Json<Organization>> {
    Ok(Json(organizations::get_organization(&state.store, auth.user_id, org_id).await?))
}

#[utoipa::path(
    delete,
    path = "/organizations/{org_id}",
    tag = "Organizations",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 204, description = "Organization and all its data deleted"),
        (status = 403, description = "Caller is not the owner")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let organization = organizations::delete_organization(&state.store, auth.user_id, org_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &organization,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/usage",
    tag = "Organizations",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses((status = 200, description = "Live usage and plan limits", body = UsageReport)),
    security(("bearerAuth" = []))
)]
pub async fn get_usage(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(org_id): Path<Uuid>,
) -> AppResult<Json<UsageReport>> {
    Ok(Json(organizations::organization_usage(&state.store, auth.user_id, org_id).await?))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/limits/{resource}",
    tag = "Organizations",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("resource" = LimitedResource, Path, description = "members or domains")
    ),
    responses((status = 200, description = "Whether one more can be created", body = LimitCheckResponse)),
    security(("bearerAuth" = []))
)]
pub async fn check_limit(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((org_id, resource)): Path<(Uuid, LimitedResource)>,
) -> AppResult<Json<LimitCheckResponse>> {
    let organization = organizations::get_organization(&state.store, auth.user_id, org_id).await?;
    let allowed = check_resource_limit(&state.store, org_id, resource).await;

    Ok(Json(LimitCheckResponse {
        resource,
        allowed,
        limit: plan_resource_limit(organization.plan, resource).finite(),
    }))
}

/// Evaluates a permission for the caller. Non-members get `allowed: false`.
#[utoipa::path(
    get,
    path = "/organizations/{org_id}/check",
    tag = "Organizations",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("resource" = String, Query, description = "domains, team, settings, properties, owners or board"),
        ("action" = String, Query, description = "read, create, update or delete")
    ),
    responses((status = 200, description = "Decision", body = CheckPermissionResponse)),
    security(("bearerAuth" = []))
)]
pub async fn check(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(org_id): Path<Uuid>,
    Query(query): Query<CheckPermissionQuery>,
) -> Json<CheckPermissionResponse> {
    let allowed = check_permission(&state.store, auth.user_id, org_id, query.resource, query.action).await;
    Json(CheckPermissionResponse { allowed })
}
