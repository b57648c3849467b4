mod common;

use anyhow::Result;
use uuid::Uuid;

use realty_authz::authz::check_permission;
use realty_authz::errors::AppError;
use realty_authz::models::membership::{BuiltInRole, Membership};
use realty_authz::models::rbac::{Action, CustomRole, Grant, Permission, PermissionSubject, Resource};
use realty_authz::services::roles;
use realty_authz::store::{MemoryStore, Store};

async fn editor_role_grants_exactly_its_actions<S: Store>(store: &S) -> Result<()> {
    let (owner, org) = common::organization(store, "acme").await?;
    let x = common::user(store, "x").await?;
    let membership = common::join(store, &org, &x, BuiltInRole::Member).await?;

    let editor = roles::create_role(
        store,
        owner.id,
        org.id,
        "Editor",
        vec![Grant::new(Resource::Domains, [Action::Read, Action::Update])],
    )
    .await?;
    roles::assign_role(store, owner.id, org.id, membership.id, Some(editor.id)).await?;

    assert!(check_permission(store, x.id, org.id, Resource::Domains, Action::Update).await);
    assert!(check_permission(store, x.id, org.id, Resource::Domains, Action::Read).await);
    assert!(!check_permission(store, x.id, org.id, Resource::Domains, Action::Delete).await);

    // Materialized rows are traceable to the role.
    let rows = store.user_permissions(org.id, x.id).await?;
    assert_eq!(rows.len(), 1);
    assert!(matches!(
        rows[0].subject,
        PermissionSubject::User { source_role_id: Some(id), .. } if id == editor.id
    ));

    // Clearing the role removes every previously granted check.
    roles::assign_role(store, owner.id, org.id, membership.id, None).await?;
    for action in [Action::Read, Action::Update] {
        assert!(!check_permission(store, x.id, org.id, Resource::Domains, action).await);
    }
    assert!(store.user_permissions(org.id, x.id).await?.is_empty());
    Ok(())
}

async fn update_role_replaces_the_whole_set<S: Store>(store: &S) -> Result<()> {
    let (owner, org) = common::organization(store, "acme").await?;
    let x = common::user(store, "x").await?;
    let membership = common::join(store, &org, &x, BuiltInRole::Member).await?;

    let role = roles::create_role(
        store,
        owner.id,
        org.id,
        "Agent",
        vec![
            Grant::new(Resource::Domains, [Action::Read]),
            Grant::new(Resource::Team, [Action::Read, Action::Create]),
        ],
    )
    .await?;
    roles::assign_role(store, owner.id, org.id, membership.id, Some(role.id)).await?;

    // Listed in resource order, the order roles report their grants in.
    let desired = vec![
        Grant::new(Resource::Settings, [Action::Read]),
        Grant::new(Resource::Properties, [Action::Create, Action::Read]),
    ];
    let first = roles::update_role(store, owner.id, org.id, role.id, "Lister", desired.clone()).await?;
    let second = roles::update_role(store, owner.id, org.id, role.id, "Lister", desired.clone()).await?;

    assert_eq!(first.name, "Lister");
    assert_eq!(first.permissions, desired);
    assert_eq!(second.permissions, desired);

    let fetched = roles::get_role(store, owner.id, org.id, role.id).await?;
    assert_eq!(fetched.permissions, desired);

    // Linked members follow the new set; nothing from the old set remains.
    assert!(check_permission(store, x.id, org.id, Resource::Properties, Action::Create).await);
    assert!(!check_permission(store, x.id, org.id, Resource::Team, Action::Create).await);
    assert!(!check_permission(store, x.id, org.id, Resource::Domains, Action::Read).await);
    Ok(())
}

async fn delete_role_revokes_materialized_grants<S: Store>(store: &S) -> Result<()> {
    let (owner, org) = common::organization(store, "acme").await?;
    let x = common::user(store, "x").await?;
    let membership = common::join(store, &org, &x, BuiltInRole::Member).await?;

    let role = roles::create_role(
        store,
        owner.id,
        org.id,
        "Board",
        vec![Grant::new(Resource::Board, [Action::Read, Action::Update])],
    )
    .await?;
    roles::assign_role(store, owner.id, org.id, membership.id, Some(role.id)).await?;
    assert!(check_permission(store, x.id, org.id, Resource::Board, Action::Update).await);

    // An ad-hoc grant is not tied to the role and survives its deletion.
    store
        .upsert_user_permission(org.id, x.id, &Grant::new(Resource::Owners, [Action::Read]))
        .await?;

    roles::delete_role(store, owner.id, org.id, role.id).await?;

    assert!(!check_permission(store, x.id, org.id, Resource::Board, Action::Update).await);
    assert!(check_permission(store, x.id, org.id, Resource::Owners, Action::Read).await);
    let refreshed = store.find_membership(org.id, x.id).await?.expect("membership");
    assert_eq!(refreshed.custom_role_id, None);

    let err = roles::get_role(store, owner.id, org.id, role.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    Ok(())
}

async fn only_the_owner_manages_roles<S: Store>(store: &S) -> Result<()> {
    let (owner, org) = common::organization(store, "acme").await?;
    let admin = common::user(store, "admin").await?;
    let membership = common::join(store, &org, &admin, BuiltInRole::Admin).await?;
    let role = roles::create_role(store, owner.id, org.id, "Viewer", vec![]).await?;

    let denied = [
        roles::create_role(store, admin.id, org.id, "Sneaky", vec![]).await.map(|_| ()),
        roles::update_role(store, admin.id, org.id, role.id, "Sneaky", vec![]).await.map(|_| ()),
        roles::assign_role(store, admin.id, org.id, membership.id, Some(role.id)).await.map(|_| ()),
        roles::delete_role(store, admin.id, org.id, role.id).await.map(|_| ()),
    ];
    for result in denied {
        assert!(matches!(result, Err(AppError::Forbidden(_))), "{result:?}");
    }

    // Non-members get not-found, and the authorization check runs before
    // validation.
    let outsider = common::user(store, "outsider").await?;
    let err = roles::create_role(store, outsider.id, org.id, "", vec![]).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = roles::create_role(store, admin.id, org.id, "", vec![]).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Members can still read roles.
    assert_eq!(roles::list_roles(store, admin.id, org.id).await?.len(), 1);
    Ok(())
}

async fn role_validation_and_scoping<S: Store>(store: &S) -> Result<()> {
    let (owner, org) = common::organization(store, "acme").await?;
    let (other_owner, other) = common::organization(store, "other").await?;
    let x = common::user(store, "x").await?;
    let membership = common::join(store, &org, &x, BuiltInRole::Member).await?;

    let err = roles::create_role(store, owner.id, org.id, "   ", vec![]).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    roles::create_role(store, owner.id, org.id, "Editor", vec![]).await?;
    let err = roles::create_role(store, owner.id, org.id, "Editor", vec![]).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    // Names are unique per organization only.
    let foreign = roles::create_role(
        store,
        other_owner.id,
        other.id,
        "Editor",
        vec![Grant::new(Resource::Settings, Action::ALL)],
    )
    .await?;

    // A role from another organization cannot be assigned, and the failed
    // assignment leaves the member's grants untouched.
    store
        .upsert_user_permission(org.id, x.id, &Grant::new(Resource::Team, [Action::Read]))
        .await?;
    let err = roles::assign_role(store, owner.id, org.id, membership.id, Some(foreign.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(check_permission(store, x.id, org.id, Resource::Team, Action::Read).await);
    assert!(!check_permission(store, x.id, org.id, Resource::Settings, Action::Read).await);

    let err = roles::assign_role(store, owner.id, org.id, Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    Ok(())
}

type GrantRow = (Resource, Vec<Action>, PermissionSubject);

fn grant_rows(permissions: Vec<Permission>) -> Vec<GrantRow> {
    let mut rows: Vec<GrantRow> = permissions
        .into_iter()
        .map(|p| (p.resource, p.actions.into_iter().collect(), p.subject))
        .collect();
    rows.sort_by_key(|row| row.0);
    rows
}

/// A write that fails after it has started changing rows must leave the
/// role and every linked member exactly as they were.
async fn failed_role_writes_leave_grants_intact<S: Store>(store: &S) -> Result<()> {
    let (owner, org) = common::organization(store, "acme").await?;
    let x = common::user(store, "x").await?;
    let membership = common::join(store, &org, &x, BuiltInRole::Editor).await?;

    let lister = roles::create_role(
        store,
        owner.id,
        org.id,
        "Lister",
        vec![Grant::new(Resource::Properties, [Action::Read, Action::Update])],
    )
    .await?;
    roles::assign_role(store, owner.id, org.id, membership.id, Some(lister.id)).await?;
    store
        .upsert_user_permission(org.id, x.id, &Grant::new(Resource::Board, [Action::Read]))
        .await?;

    let role_before = grant_rows(store.role_permissions(lister.id).await?);
    let member_before = grant_rows(store.user_permissions(org.id, x.id).await?);
    assert_eq!(member_before.len(), 2);

    // Two grants for one resource pass straight to the store, so the
    // failure happens after the old set was already cleared.
    let role = store.find_role(org.id, lister.id).await?.expect("role exists");
    let renamed = CustomRole {
        name: "Renamed".to_string(),
        ..role
    };
    let twice = Grant::new(Resource::Domains, [Action::Read]);
    let err = store.replace_role(&renamed, &[twice.clone(), twice]).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {err:?}");

    let role_after = store.find_role(org.id, lister.id).await?.expect("role still exists");
    assert_eq!(role_after.name, "Lister");
    assert_eq!(grant_rows(store.role_permissions(lister.id).await?), role_before);
    assert_eq!(grant_rows(store.user_permissions(org.id, x.id).await?), member_before);
    assert!(check_permission(store, x.id, org.id, Resource::Properties, Action::Update).await);
    assert!(!check_permission(store, x.id, org.id, Resource::Domains, Action::Read).await);

    // Same for assignment: the membership lookup fails inside the write.
    let stale = Membership {
        id: Uuid::new_v4(),
        ..membership.clone()
    };
    let err = store.assign_role(&stale, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
    assert_eq!(grant_rows(store.user_permissions(org.id, x.id).await?), member_before);
    let current = store.find_membership(org.id, x.id).await?.expect("still a member");
    assert_eq!(current.custom_role_id, Some(lister.id));
    Ok(())
}

#[tokio::test]
async fn role_management_in_memory() -> Result<()> {
    editor_role_grants_exactly_its_actions(&MemoryStore::new()).await?;
    update_role_replaces_the_whole_set(&MemoryStore::new()).await?;
    delete_role_revokes_materialized_grants(&MemoryStore::new()).await?;
    only_the_owner_manages_roles(&MemoryStore::new()).await?;
    role_validation_and_scoping(&MemoryStore::new()).await?;
    failed_role_writes_leave_grants_intact(&MemoryStore::new()).await?;
    Ok(())
}

#[tokio::test]
async fn editor_role_scenario_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    editor_role_grants_exactly_its_actions(&store).await
}

#[tokio::test]
async fn update_role_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    update_role_replaces_the_whole_set(&store).await
}

#[tokio::test]
async fn delete_role_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    delete_role_revokes_materialized_grants(&store).await
}

#[tokio::test]
async fn owner_only_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    only_the_owner_manages_roles(&store).await
}

#[tokio::test]
async fn validation_and_scoping_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    role_validation_and_scoping(&store).await
}

#[tokio::test]
async fn failed_role_writes_roll_back_sqlite() -> Result<()> {
    let (_dir, store) = common::sqlite_store().await?;
    failed_role_writes_leave_grants_intact(&store).await
}
