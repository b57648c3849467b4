mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn member_limit_surfaces_as_payment_required() -> Result<()> {
    let (_dir, app, _pool) = common::app().await?;
    let (owner_token, _) = common::register(&app, "Owner").await?;
    for name in ["Ann", "Bob", "Cid"] {
        common::register(&app, name).await?;
    }

    let (status, org) = common::send(
        &app,
        "POST",
        "/organizations",
        Some(&owner_token),
        Some(json!({ "name": "Harbor Realty" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "create org failed: {org}");
    assert_eq!(org["slug"], "harbor-realty");
    assert_eq!(org["plan"], "FREE");
    let org_id = org["id"].as_str().context("missing org id")?.to_string();

    for email in ["ann@example.com", "bob@example.com"] {
        let (status, body) = common::send(
            &app,
            "POST",
            &format!("/organizations/{org_id}/members"),
            Some(&owner_token),
            Some(json!({ "email": email })),
        )
        .await?;
        assert_eq!(status, StatusCode::CREATED, "add member failed: {body}");
        assert_eq!(body["role"], "MEMBER");
    }

    let (status, body) = common::send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/members"),
        Some(&owner_token),
        Some(json!({ "email": "cid@example.com" })),
    )
    .await?;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "plan_restriction");
    assert_eq!(body["resource"], "members");
    assert_eq!(body["limit"], 3);
    assert_eq!(body["upgrade_required"], true);

    let (status, usage) =
        common::send(&app, "GET", &format!("/organizations/{org_id}/usage"), Some(&owner_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["usage"]["members"], 3);

    let (status, limit) = common::send(
        &app,
        "GET",
        &format!("/organizations/{org_id}/limits/members"),
        Some(&owner_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(limit["allowed"], false);

    let (status, org) = common::send_billing(
        &app,
        &org_id,
        Some(common::BILLING_SECRET),
        json!({ "plan": "STARTER", "billing_customer_id": "cus_1", "billing_subscription_id": "sub_1" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "billing update failed: {org}");
    assert_eq!(org["plan"], "STARTER");

    let (status, _) = common::send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/members"),
        Some(&owner_token),
        Some(json!({ "email": "cid@example.com" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn custom_role_drives_permission_checks() -> Result<()> {
    let (_dir, app, _pool) = common::app().await?;
    let (owner_token, _) = common::register(&app, "Owner").await?;
    let (agent_token, agent_id) = common::register(&app, "Agent").await?;

    let (_, org) = common::send(
        &app,
        "POST",
        "/organizations",
        Some(&owner_token),
        Some(json!({ "name": "Harbor", "slug": "harbor" })),
    )
    .await?;
    let org_id = org["id"].as_str().context("missing org id")?.to_string();

    let (_, membership) = common::send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/members"),
        Some(&owner_token),
        Some(json!({ "email": "agent@example.com", "role": "EDITOR" })),
    )
    .await?;
    let membership_id = membership["id"].as_str().context("missing membership id")?.to_string();

    let check_uri = format!("/organizations/{org_id}/check?resource=properties&action=update");
    let (status, decision) = common::send(&app, "GET", &check_uri, Some(&agent_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decision["allowed"], false);

    let (status, role) = common::send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/roles"),
        Some(&owner_token),
        Some(json!({
            "name": "Editor",
            "permissions": [{ "resource": "properties", "actions": ["read", "update"] }]
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "role create failed: {role}");
    let role_id = role["id"].as_str().context("missing role id")?.to_string();

    // Only the owner manages roles.
    let (status, _) = common::send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/roles"),
        Some(&agent_token),
        Some(json!({ "name": "Sneaky", "permissions": [] })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, assigned) = common::send(
        &app,
        "PUT",
        &format!("/organizations/{org_id}/members/{membership_id}/role"),
        Some(&owner_token),
        Some(json!({ "role_id": role_id })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK, "assign failed: {assigned}");
    assert_eq!(assigned["custom_role_id"], role_id.as_str());

    let (_, decision) = common::send(&app, "GET", &check_uri, Some(&agent_token), None).await?;
    assert_eq!(decision["allowed"], true);

    let (status, effective) = common::send(
        &app,
        "GET",
        &format!("/organizations/{org_id}/users/{agent_id}/effective-permissions"),
        Some(&agent_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(effective["permissions"][0]["resource"], "properties");
    assert_eq!(effective["permissions"][0]["source"], "role");

    let (status, _) = common::send(
        &app,
        "DELETE",
        &format!("/organizations/{org_id}/roles/{role_id}"),
        Some(&owner_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, decision) = common::send(&app, "GET", &check_uri, Some(&agent_token), None).await?;
    assert_eq!(decision["allowed"], false);
    Ok(())
}

#[tokio::test]
async fn tenant_routes_hide_foreign_organizations() -> Result<()> {
    let (_dir, app, _pool) = common::app().await?;
    let (owner_token, _) = common::register(&app, "Owner").await?;
    let (stranger_token, _) = common::register(&app, "Stranger").await?;

    let (_, org) = common::send(
        &app,
        "POST",
        "/organizations",
        Some(&owner_token),
        Some(json!({ "name": "Private" })),
    )
    .await?;
    let org_id = org["id"].as_str().context("missing org id")?.to_string();

    let (status, _) = common::send(&app, "GET", &format!("/organizations/{org_id}"), None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) =
        common::send(&app, "GET", &format!("/organizations/{org_id}"), Some(&stranger_token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, decision) = common::send(
        &app,
        "GET",
        &format!("/organizations/{org_id}/check?resource=settings&action=read"),
        Some(&stranger_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decision["allowed"], false);

    let (status, _) = common::send(
        &app,
        "GET",
        &format!("/organizations/{org_id}/members"),
        Some("not-a-jwt"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn owners_cannot_change_their_own_plan() -> Result<()> {
    let (_dir, app, _pool) = common::app().await?;
    let (owner_token, _) = common::register(&app, "Owner").await?;

    let (_, org) = common::send(
        &app,
        "POST",
        "/organizations",
        Some(&owner_token),
        Some(json!({ "name": "Cheapskate" })),
    )
    .await?;
    let org_id = org["id"].as_str().context("missing org id")?.to_string();
    let upgrade = json!({ "plan": "ENTERPRISE" });

    // A user token is not billing authority, on either path.
    let (status, _) = common::send(
        &app,
        "PUT",
        &format!("/organizations/{org_id}/billing"),
        Some(&owner_token),
        Some(upgrade.clone()),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = common::send(
        &app,
        "PUT",
        &format!("/billing/organizations/{org_id}"),
        Some(&owner_token),
        Some(upgrade.clone()),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = common::send_billing(&app, &org_id, Some("whsec_guess"), upgrade.clone()).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, org) = common::send(&app, "GET", &format!("/organizations/{org_id}"), Some(&owner_token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(org["plan"], "FREE");

    let (status, _) = common::send_billing(&app, &Uuid::new_v4().to_string(), Some(common::BILLING_SECRET), upgrade).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
