use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::BillingConfig;
use crate::db::SqliteStore;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, billing, domains, health, members, organizations, roles};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub store: SqliteStore,
    pub jwt: Arc<JwtConfig>,
    pub billing: Arc<BillingConfig>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, billing: BillingConfig, event_bus: EventBus) -> Self {
        Self {
            store: SqliteStore::new(pool.clone()),
            pool,
            jwt: Arc::new(jwt),
            billing: Arc::new(billing),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, BillingConfig::from_env(), event_bus);
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    // Every tenant route is scoped to /organizations/:org_id
    let organization_routes = organizations::routes()
        .merge(members::routes())
        .merge(roles::routes())
        .merge(domains::routes());

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/organizations", organization_routes)
        .nest("/billing", billing::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
