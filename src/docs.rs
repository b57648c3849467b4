use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::openapi::server::Server;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::organizations::list_organizations,
		routes::organizations::create_organization,
		routes::organizations::get_organization,
		routes::organizations::delete_organization,
		routes::billing::update_billing,
		routes::organizations::get_usage,
		routes::organizations::check_limit,
		routes::organizations::check,
		routes::members::list_members,
		routes::members::add_member,
		routes::members::change_member_role,
		routes::members::remove_member,
		routes::members::leave,
		routes::members::assign_role,
		routes::members::grant_permission,
		routes::members::revoke_permission,
		routes::members::transfer_ownership,
		routes::members::effective_permissions,
		routes::roles::list_roles,
		routes::roles::create_role,
		routes::roles::get_role,
		routes::roles::update_role,
		routes::roles::delete_role,
		routes::domains::list_domains,
		routes::domains::create_domain,
		routes::domains::delete_domain
	),
	components(
		schemas(
			routes::health::HealthResponse,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::organization::Organization,
			models::organization::CreateOrganizationRequest,
			models::organization::BillingUpdate,
			models::plan::Plan,
			models::plan::LimitedResource,
			models::plan::Usage,
			models::plan::UsageReport,
			models::plan::LimitCheckResponse,
			models::membership::BuiltInRole,
			models::membership::Membership,
			models::membership::AddMemberRequest,
			models::membership::ChangeMemberRoleRequest,
			models::membership::TransferOwnershipRequest,
			models::rbac::Resource,
			models::rbac::Action,
			models::rbac::Grant,
			models::rbac::Permission,
			models::rbac::CustomRole,
			models::rbac::RoleDetail,
			models::rbac::RoleRequest,
			models::rbac::AssignRoleRequest,
			models::rbac::GrantPermissionRequest,
			models::rbac::CheckPermissionResponse,
			models::rbac::EffectivePermissions,
			models::rbac::EffectivePermission,
			models::domain::Domain,
			models::domain::CreateDomainRequest
		)
	),
	modifiers(&BearerAuth),
	tags(
		(name = "Health", description = "Liveness"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Organizations", description = "Tenants, plans and permission checks"),
		(name = "Members", description = "Team management and direct grants"),
		(name = "Roles", description = "Organization-defined custom roles"),
		(name = "Domains", description = "Plan-limited custom domains"),
		(name = "Billing", description = "Plan writes from the billing provider")
	)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		if let Some(components) = openapi.components.as_mut() {
			components.add_security_scheme(
				"bearerAuth",
				SecurityScheme::Http(
					HttpBuilder::new()
						.scheme(HttpAuthScheme::Bearer)
						.bearer_format("JWT")
						.build(),
				),
			);
		}
	}
}

pub fn build_openapi(port: u16) -> utoipa::openapi::OpenApi {
	let mut doc = ApiDoc::openapi();
	doc.servers = Some(vec![Server::new(format!("http://localhost:{port}"))]);
	doc
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", doc))
}
