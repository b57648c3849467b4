//! Team management: members, ownership, custom role assignment and direct
//! grants. Permission and ownership changes are logged as critical.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::membership::{AddMemberRequest, ChangeMemberRoleRequest, Membership, TransferOwnershipRequest};
use crate::models::rbac::{AssignRoleRequest, EffectivePermissions, GrantPermissionRequest, Permission, Resource};
use crate::services::{members, roles};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:org_id/members", get(list_members).post(add_member))
        .route("/:org_id/members/:membership_id", put(change_member_role).delete(remove_member))
        .route("/:org_id/members/:membership_id/role", put(assign_role))
        .route("/:org_id/members/:membership_id/permissions", post(grant_permission))
        .route("/:org_id/members/:membership_id/permissions/:resource", delete(revoke_permission))
        .route("/:org_id/ownership", post(transfer_ownership))
        .route("/:org_id/users/:user_id/effective-permissions", get(effective_permissions))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/members",
    tag = "Members",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Members", body = Vec<Membership>),
        (status = 403, description = "Missing team:read")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(org_id): Path<Uuid>,
) -> AppResult<Json<Vec<Membership>>> {
    Ok(Json(members::list_members(&state.store, auth.user_id, org_id).await?))
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/members",
    tag = "Members",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = Membership),
        (status = 402, description = "Member limit of the plan reached"),
        (status = 403, description = "Missing team:create"),
        (status = 409, description = "Already a member")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<Membership>)> {
    let membership = members::add_member(&state.store, auth.user_id, org_id, &req.email, req.role).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &membership,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(membership)))
}

#[utoipa::path(
    put,
    path = "/organizations/{org_id}/members/{membership_id}",
    tag = "Members",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("membership_id" = Uuid, Path, description = "Membership ID")
    ),
    request_body = ChangeMemberRoleRequest,
    responses(
        (status = 200, description = "Built-in role changed", body = Membership),
        (status = 403, description = "Caller is not the owner"),
        (status = 409, description = "Target is the owner")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_member_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((org_id, membership_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ChangeMemberRoleRequest>,
) -> AppResult<Json<Membership>> {
    let membership = members::change_member_role(&state.store, auth.user_id, org_id, membership_id, req.role).await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &membership,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(membership))
}

#[utoipa::path(
    delete,
    path = "/organizations/{org_id}/members/{membership_id}",
    tag = "Members",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("membership_id" = Uuid, Path, description = "Membership ID")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Missing team:delete"),
        (status = 409, description = "Target is the owner")
    ),
    security(("bearerAuth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((org_id, membership_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let membership = members::remove_member(&state.store, auth.user_id, org_id, membership_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "removed",
        Some(auth.user_id),
        &membership,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/leave",
    tag = "Members",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 204, description = "Left the organization"),
        (status = 409, description = "The owner cannot leave")
    ),
    security(("bearerAuth" = []))
)]
pub async fn leave(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let membership = members::leave_organization(&state.store, auth.user_id, org_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "removed",
        Some(auth.user_id),
        &membership,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the member's granular permissions with the role's, or clears
/// them when `role_id` is null.
#[utoipa::path(
    put,
    path = "/organizations/{org_id}/members/{membership_id}/role",
    tag = "Members",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("membership_id" = Uuid, Path, description = "Membership ID")
    ),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = Membership),
        (status = 403, description = "Caller is not the owner"),
        (status = 404, description = "Membership or role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((org_id, membership_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AssignRoleRequest>,
) -> AppResult<Json<Membership>> {
    let membership = roles::assign_role(&state.store, auth.user_id, org_id, membership_id, req.role_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "assigned",
        Some(auth.user_id),
        &membership,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(membership))
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/members/{membership_id}/permissions",
    tag = "Members",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("membership_id" = Uuid, Path, description = "Membership ID")
    ),
    request_body = GrantPermissionRequest,
    responses(
        (status = 201, description = "Permission granted", body = Permission),
        (status = 403, description = "Caller is not the owner")
    ),
    security(("bearerAuth" = []))
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((org_id, membership_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<GrantPermissionRequest>,
) -> AppResult<(StatusCode, Json<Permission>)> {
    let permission =
        members::grant_user_permission(&state.store, auth.user_id, org_id, membership_id, req.resource, req.actions)
            .await?;

    log_activity_with_context(
        &state.event_bus,
        "granted",
        Some(auth.user_id),
        &permission,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(permission)))
}

#[utoipa::path(
    delete,
    path = "/organizations/{org_id}/members/{membership_id}/permissions/{resource}",
    tag = "Members",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("membership_id" = Uuid, Path, description = "Membership ID"),
        ("resource" = String, Path, description = "Resource whose grant is revoked")
    ),
    responses(
        (status = 204, description = "Permission revoked"),
        (status = 404, description = "No grant for that resource")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_permission(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((org_id, membership_id, resource)): Path<(Uuid, Uuid, Resource)>,
) -> AppResult<StatusCode> {
    let permission =
        members::revoke_user_permission(&state.store, auth.user_id, org_id, membership_id, resource).await?;

    log_activity_with_context(
        &state.event_bus,
        "revoked",
        Some(auth.user_id),
        &permission,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/organizations/{org_id}/ownership",
    tag = "Members",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = TransferOwnershipRequest,
    responses(
        (status = 200, description = "New owner membership", body = Membership),
        (status = 403, description = "Caller is not the owner")
    ),
    security(("bearerAuth" = []))
)]
pub async fn transfer_ownership(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(org_id): Path<Uuid>,
    Json(req): Json<TransferOwnershipRequest>,
) -> AppResult<Json<Membership>> {
    let membership = members::transfer_ownership(&state.store, auth.user_id, org_id, req.membership_id).await?;

    log_activity_with_context(
        &state.event_bus,
        "transferred",
        Some(auth.user_id),
        &membership,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(membership))
}

#[utoipa::path(
    get,
    path = "/organizations/{org_id}/users/{user_id}/effective-permissions",
    tag = "Members",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ("user_id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Resolved grants with their source", body = EffectivePermissions),
        (status = 403, description = "Only the owner may inspect other members")
    ),
    security(("bearerAuth" = []))
)]
pub async fn effective_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((org_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<EffectivePermissions>> {
    Ok(Json(members::effective_permissions(&state.store, auth.user_id, org_id, user_id).await?))
}
