//! Custom role management. Writes are owner-only and logged as critical.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::rbac::{RoleDetail, RoleRequest};
use crate::services::roles;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:org_id/roles", get(list_roles).post(create_role))
        .route("/:org_id/roles/:role_id", get(get_role).put(update_role).delete(delete_role))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/roles",
    tag = "Roles",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses((status = 200, description = "Roles with their permissions", body = Vec<RoleDetail>)),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(org_id): Path<Uuid>,
) -> AppResult<Json<Vec<RoleDetail>>> {
    Ok(Json(roles::list_roles(&state.store, auth.user_id, org_id).await?))
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/roles",
    tag = "Roles",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = RoleRequest,
    responses(
        (status = 201, description = "Role created", body = RoleDetail),
        (status = 400, description = "Empty role name"),
        (status = 403, description = "Caller is not the owner"),
        (status = 409, description = "Role name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<RoleRequest>,
) -> AppResult<(StatusCode, Json<RoleDetail>)> {
    let role = roles::create_role(&state.store, auth.user_id, org_id, &req.name, req.permissions).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/roles/{role_id}",
    tag = "Roles",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("role_id" = Uuid, Path, description = "Role ID")
    ),
    responses(
        (status = 200, description = "Role", body = RoleDetail),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((org_id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<RoleDetail>> {
    Ok(Json(roles::get_role(&state.store, auth.user_id, org_id, role_id).await?))
}

/// Full replacement: the submitted permission list becomes the role's
/// entire permission set.
#[utoipa::path(
    put,
    path = "/organizations/{org_id}/roles/{role_id}",
    tag = "Roles",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("role_id" = Uuid, Path, description = "Role ID")
    ),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Role replaced", body = RoleDetail),
        (status = 403, description = "Caller is not the owner"),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((org_id, role_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<RoleRequest>,
) -> AppResult<Json<RoleDetail>> {
    let role = roles::update_role(&state.store, auth.user_id, org_id, role_id, &req.name, req.permissions).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(role))
}

#[utoipa::path(
    delete,
    path = "/organizations/{org_id}/roles/{role_id}",
    tag = "Roles",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("role_id" = Uuid, Path, description = "Role ID")
    ),
    responses(
        (status = 204, description = "Role deleted and its grants revoked from members"),
        (status = 403, description = "Caller is not the owner"),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((org_id, role_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let role = roles::delete_role(&state.store, auth.user_id, org_id, role_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
