#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use realty_authz::db::{self, SqliteStore};
use realty_authz::models::membership::{BuiltInRole, Membership};
use realty_authz::models::organization::{BillingUpdate, Organization};
use realty_authz::models::plan::{Limit, Plan};
use realty_authz::models::user::DbUser;
use realty_authz::services::organizations;
use realty_authz::store::Store;

/// Migrated SQLite database in a temp dir. Keep the `TempDir` alive for the
/// duration of the test.
pub async fn sqlite_pool() -> Result<(TempDir, SqlitePool)> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let pool = db::connect(&url, 5).await?;

    let migrator =
        sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

pub async fn sqlite_store() -> Result<(TempDir, SqliteStore)> {
    let (dir, pool) = sqlite_pool().await?;
    Ok((dir, SqliteStore::new(pool)))
}

/// Inserts a user without a password; skips hashing so bulk setups stay fast.
pub async fn user<S: Store>(store: &S, name: &str) -> Result<DbUser> {
    let user = DbUser::new(name, format!("{}@example.com", name.to_lowercase()), None);
    store.insert_user(&user).await?;
    Ok(user)
}

/// An owner and a fresh FREE organization they own.
pub async fn organization<S: Store>(store: &S, slug: &str) -> Result<(DbUser, Organization)> {
    let owner = user(store, &format!("{slug}-owner")).await?;
    let org = organizations::create_organization(store, owner.id, slug, Some(slug)).await?;
    Ok((owner, org))
}

/// Adds `user` straight through the store, bypassing plan limits.
pub async fn join<S: Store>(store: &S, org: &Organization, user: &DbUser, role: BuiltInRole) -> Result<Membership> {
    let membership = Membership::new(org.id, user.id, role);
    let inserted = store.insert_membership_within(&membership, Limit::Unlimited).await?;
    anyhow::ensure!(inserted, "membership insert refused");
    Ok(membership)
}

pub async fn set_plan<S: Store>(store: &S, org: &Organization, plan: Plan) -> Result<Organization> {
    let billing = BillingUpdate {
        plan,
        billing_customer_id: Some("cus_test".to_string()),
        billing_subscription_id: Some("sub_test".to_string()),
    };
    Ok(organizations::update_billing(store, org.id, &billing).await?)
}

pub const BILLING_SECRET: &str = "whsec_test";

pub async fn app() -> Result<(TempDir, Router, SqlitePool)> {
    let (dir, pool) = sqlite_pool().await?;
    std::env::set_var("JWT_SECRET", "test-secret");
    std::env::set_var("BILLING_WEBHOOK_SECRET", BILLING_SECRET);
    let app = realty_authz::create_app(pool.clone()).await?;
    Ok((dir, app, pool))
}

/// Sends a billing webhook call, optionally with the shared secret.
pub async fn send_billing(app: &Router, org_id: &str, secret: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder()
        .method("PUT")
        .uri(format!("/billing/organizations/{org_id}"))
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header(realty_authz::config::BILLING_SECRET_HEADER, secret);
    }
    let req = builder.body(Body::from(body.to_string()))?;
    read(app.clone().oneshot(req).await?).await
}

async fn read(resp: axum::response::Response) -> Result<(StatusCode, Value)> {
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    read(app.clone().oneshot(req).await?).await
}

/// Registers through the API and returns (token, user id).
pub async fn register(app: &Router, name: &str) -> Result<(String, String)> {
    let body = serde_json::json!({
        "name": name,
        "email": format!("{}@example.com", name.to_lowercase()),
        "password": "password123"
    });
    let (status, value) = send(app, "POST", "/auth/register", None, Some(body)).await?;
    anyhow::ensure!(status == StatusCode::CREATED, "register failed: {status} {value}");

    let token = value["token"].as_str().context("missing token")?.to_string();
    let id = value["user"]["id"].as_str().context("missing user id")?.to_string();
    Ok((token, id))
}
