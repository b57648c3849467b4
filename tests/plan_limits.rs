mod common;

use anyhow::Result;
use std::sync::Arc;

use realty_authz::errors::AppError;
use realty_authz::models::membership::BuiltInRole;
use realty_authz::models::plan::{Limit, LimitedResource, Plan, Usage};
use realty_authz::models::rbac::{Action, Grant, Resource};
use realty_authz::plans::{check_resource_limit, enforce_resource_limit, organization_usage, plan_resource_limit};
use realty_authz::services::{domains, members};
use realty_authz::store::{MemoryStore, Store};

fn assert_plan_restriction(err: AppError, resource: LimitedResource, max: u64) {
    match err {
        AppError::PlanRestriction { resource: r, limit } => {
            assert_eq!(r, resource);
            assert_eq!(limit, Limit::Finite(max));
        }
        other => panic!("expected plan restriction, got {other:?}"),
    }
}

async fn free_plan_admits_three_members<S: Store>(store: &S) -> Result<()> {
    assert_eq!(plan_resource_limit(Plan::Free, LimitedResource::Members), Limit::Finite(3));

    let (owner, org) = common::organization(store, "acme").await?;
    for name in ["second", "third", "fourth"] {
        common::user(store, name).await?;
    }

    members::add_member(store, owner.id, org.id, "second@example.com", None).await?;
    // The 3rd membership still fits.
    members::add_member(store, owner.id, org.id, "third@example.com", None).await?;

    let err = enforce_resource_limit(store, org.id, Plan::Free, LimitedResource::Members)
        .await
        .unwrap_err();
    assert_plan_restriction(err, LimitedResource::Members, 3);

    let err = members::add_member(store, owner.id, org.id, "fourth@example.com", None)
        .await
        .unwrap_err();
    assert_plan_restriction(err, LimitedResource::Members, 3);
    assert_eq!(store.count_memberships(org.id).await?, 3);
    Ok(())
}

async fn upgrade_lifts_the_member_limit<S: Store>(store: &S) -> Result<()> {
    let (owner, org) = common::organization(store, "acme").await?;
    let org = common::set_plan(store, &org, Plan::Starter).await?;
    for i in 0..9 {
        let user = common::user(store, &format!("agent{i}")).await?;
        common::join(store, &org, &user, BuiltInRole::Member).await?;
    }
    assert_eq!(organization_usage(store, org.id).await?.members, 10);

    common::user(store, "eleventh").await?;
    let err = members::add_member(store, owner.id, org.id, "eleventh@example.com", None)
        .await
        .unwrap_err();
    assert_plan_restriction(err, LimitedResource::Members, 10);
    assert!(!check_resource_limit(store, org.id, LimitedResource::Members).await);

    // The gate reads the plan on every call.
    common::set_plan(store, &org, Plan::Pro).await?;
    assert!(check_resource_limit(store, org.id, LimitedResource::Members).await);
    members::add_member(store, owner.id, org.id, "eleventh@example.com", None).await?;
    assert_eq!(organization_usage(store, org.id).await?.members, 11);
    Ok(())
}

async fn usage_counts_members_and_domains<S: Store>(store: &S) -> Result<()> {
    let (owner, org) = common::organization(store, "acme").await?;
    let org = common::set_plan(store, &org, Plan::Pro).await?;
    assert_eq!(organization_usage(store, org.id).await?, Usage { members: 1, domains: 0 });

    for i in 0..4 {
        let user = common::user(store, &format!("agent{i}")).await?;
        common::join(store, &org, &user, BuiltInRole::Member).await?;
    }
    for host in ["a.example.com", "b.example.com", "c.example.com"] {
        domains::create_domain(store, owner.id, org.id, host).await?;
    }

    assert_eq!(organization_usage(store, org.id).await?, Usage { members: 5, domains: 3 });
    Ok(())
}

async fn domains_are_gated_and_permissioned<S: Store>(store: &S) -> Result<()> {
    let (owner, org) = common::organization(store, "acme").await?;
    let agent = common::user(store, "agent").await?;
    common::join(store, &org, &agent, BuiltInRole::Editor).await?;

    let err = domains::create_domain(store, agent.id, org.id, "agent.example.com").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    store
        .upsert_user_permission(org.id, agent.id, &Grant::new(Resource::Domains, [Action::Create, Action::Read]))
        .await?;
    domains::create_domain(store, agent.id, org.id, "agent.example.com").await?;

    // FREE allows a single domain, whoever asks.
    let err = domains::create_domain(store, owner.id, org.id, "second.example.com").await.unwrap_err();
    assert_plan_restriction(err, LimitedResource::Domains, 1);

    common::set_plan(store, &org, Plan::Enterprise).await?;
    for i in 0..12 {
        domains::create_domain(store, owner.id, org.id, &format!("site{i}.example.com")).await?;
    }
    assert_eq!(domains::list_domains(store, agent.id, org.id).await?.len(), 13);
    assert!(enforce_resource_limit(store, org.id, Plan::Enterprise, LimitedResource::Domains).await? == Limit::Unlimited);
    Ok(())
}

#[tokio::test]
async fn plan_limits_in_memory() -> Result<()> {
    free_plan_admits_three_members(&MemoryStore::new()).await?;
    upgrade_lifts_the_member_limit(&MemoryStore::new()).await?;
    usage_counts_members_and_domains(&MemoryStore::new()).await?;
    domains_are_gated_and_permissioned(&MemoryStore::new()).await?;
    Ok(())
}

#[tokio::test]
async fn free_plan_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    free_plan_admits_three_members(&store).await
}

#[tokio::test]
async fn starter_to_pro_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    upgrade_lifts_the_member_limit(&store).await
}

#[tokio::test]
async fn usage_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    usage_counts_members_and_domains(&store).await
}

#[tokio::test]
async fn domains_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    domains_are_gated_and_permissioned(&store).await
}

/// Concurrent invites race between the usage check and the insert. The
/// conditional insert is the enforcement point: however the requests
/// interleave, the organization never ends up above its limit.
async fn concurrent_invites_never_overshoot<S: Store + Clone + 'static>(store: S) -> Result<()> {
    let (owner, org) = common::organization(&store, "racy").await?;
    let (owner_id, org_id) = (owner.id, org.id);
    let store = Arc::new(store);

    let mut emails = Vec::new();
    for i in 0..12 {
        let user = common::user(store.as_ref(), &format!("invitee{i}")).await?;
        emails.push(user.email);
    }

    let mut handles = Vec::new();
    for email in emails {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            members::add_member(store.as_ref(), owner_id, org_id, &email, None).await
        }));
    }

    let mut admitted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => admitted += 1,
            Err(err) if err.is_plan_restriction() => refused += 1,
            Err(other) => anyhow::bail!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(admitted, 2, "owner plus two invitees fill the FREE plan");
    assert_eq!(refused, 10);
    assert_eq!(store.count_memberships(org_id).await?, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invites_in_memory() -> Result<()> {
    concurrent_invites_never_overshoot(MemoryStore::new()).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invites_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    concurrent_invites_never_overshoot(store).await
}
