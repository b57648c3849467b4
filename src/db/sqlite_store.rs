//! sqlx-backed implementation of the repository traits.
//!
//! Multi-row writes run inside one transaction; returning early with `?`
//! drops the transaction, which rolls it back. Plan-limited inserts are a
//! single `INSERT ... SELECT ... WHERE count < limit` statement so the count
//! and the insert cannot interleave with another writer.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::row_parsers::{self, parse_all};
use crate::errors::{AppError, AppResult};
use crate::models::domain::Domain;
use crate::models::membership::{BuiltInRole, Membership};
use crate::models::organization::{BillingUpdate, Organization};
use crate::models::plan::Limit;
use crate::models::rbac::{Action, CustomRole, Grant, Permission, Resource};
use crate::models::user::DbUser;
use crate::store::{
    DomainRepository, MembershipRepository, OrganizationRepository, PermissionRepository, RoleRepository,
    UserRepository,
};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn actions_json(actions: &BTreeSet<Action>) -> AppResult<String> {
    serde_json::to_string(actions).map_err(|e| AppError::internal(format!("failed to encode actions: {e}")))
}

fn limit_param(limit: Limit) -> i64 {
    limit
        .finite()
        .map(|max| i64::try_from(max).unwrap_or(i64::MAX))
        .unwrap_or(i64::MAX)
}

fn sorted(mut permissions: Vec<Permission>) -> Vec<Permission> {
    permissions.sort_by_key(|p| p.resource);
    permissions
}

async fn insert_role_grants(conn: &mut SqliteConnection, role: &CustomRole, grants: &[Grant]) -> AppResult<()> {
    let now = Utc::now();
    for grant in grants {
        sqlx::query(
            "INSERT INTO permissions (id, organization_id, resource, actions, role_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(role.organization_id.to_string())
        .bind(grant.resource.as_str())
        .bind(actions_json(&grant.actions)?)
        .bind(role.id.to_string())
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::on_unique(e, format!("duplicate grant for {}", grant.resource)))?;
    }
    Ok(())
}

/// Copies role grants onto a user; resources the user already holds are kept.
async fn copy_role_grants(
    conn: &mut SqliteConnection,
    organization_id: Uuid,
    user_id: Uuid,
    role_id: Uuid,
    grants: &[Grant],
) -> AppResult<()> {
    let now = Utc::now();
    for grant in grants {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO permissions (id, organization_id, resource, actions, user_id, source_role_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(organization_id.to_string())
        .bind(grant.resource.as_str())
        .bind(actions_json(&grant.actions)?)
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_role_grants(conn: &mut SqliteConnection, role_id: Uuid) -> AppResult<Vec<Grant>> {
    let rows = sqlx::query(
        "SELECT id, organization_id, resource, actions, role_id, user_id, source_role_id, created_at FROM permissions WHERE role_id = ?",
    )
    .bind(role_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let permissions = parse_all(&rows, row_parsers::permission_from_row)?;
    Ok(sorted(permissions).iter().map(Permission::grant).collect())
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn insert_user(&self, user: &DbUser) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO users (id, name, email, avatar_url, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.avatar_url)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::on_unique(e, "email already in use"))?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> AppResult<Option<DbUser>> {
        let row = sqlx::query(
            "SELECT id, name, email, avatar_url, password_hash, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_parsers::user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<DbUser>> {
        let row = sqlx::query(
            "SELECT id, name, email, avatar_url, password_hash, created_at, updated_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_parsers::user_from_row).transpose()
    }
}

#[async_trait]
impl OrganizationRepository for SqliteStore {
    async fn insert_organization(&self, organization: &Organization, owner: &Membership) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO organizations (id, slug, name, plan, billing_customer_id, billing_subscription_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(organization.id.to_string())
        .bind(&organization.slug)
        .bind(&organization.name)
        .bind(organization.plan.as_str())
        .bind(&organization.billing_customer_id)
        .bind(&organization.billing_subscription_id)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::on_unique(e, "organization slug already in use"))?;

        sqlx::query(
            "INSERT INTO memberships (id, organization_id, user_id, role, custom_role_id, created_at) VALUES (?, ?, ?, ?, NULL, ?)",
        )
        .bind(owner.id.to_string())
        .bind(owner.organization_id.to_string())
        .bind(owner.user_id.to_string())
        .bind(owner.role.as_str())
        .bind(owner.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_organization(&self, id: Uuid) -> AppResult<Option<Organization>> {
        let row = sqlx::query(
            "SELECT id, slug, name, plan, billing_customer_id, billing_subscription_id, created_at, updated_at FROM organizations WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_parsers::organization_from_row).transpose()
    }

    async fn find_organization_by_slug(&self, slug: &str) -> AppResult<Option<Organization>> {
        let row = sqlx::query(
            "SELECT id, slug, name, plan, billing_customer_id, billing_subscription_id, created_at, updated_at FROM organizations WHERE slug = ?",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_parsers::organization_from_row).transpose()
    }

    async fn list_organizations_for_user(&self, user_id: Uuid) -> AppResult<Vec<Organization>> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.slug, o.name, o.plan, o.billing_customer_id, o.billing_subscription_id, o.created_at, o.updated_at
            FROM organizations o
            INNER JOIN memberships m ON m.organization_id = o.id
            WHERE m.user_id = ?
            ORDER BY o.name
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        parse_all(&rows, row_parsers::organization_from_row)
    }

    async fn update_billing(&self, id: Uuid, billing: &BillingUpdate) -> AppResult<Option<Organization>> {
        let result = sqlx::query(
            "UPDATE organizations SET plan = ?, billing_customer_id = ?, billing_subscription_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(billing.plan.as_str())
        .bind(&billing.billing_customer_id)
        .bind(&billing.billing_subscription_id)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_organization(id).await
    }

    async fn delete_organization(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MembershipRepository for SqliteStore {
    async fn find_membership(&self, organization_id: Uuid, user_id: Uuid) -> AppResult<Option<Membership>> {
        let row = sqlx::query(
            "SELECT id, organization_id, user_id, role, custom_role_id, created_at FROM memberships WHERE organization_id = ? AND user_id = ?",
        )
        .bind(organization_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_parsers::membership_from_row).transpose()
    }

    async fn find_membership_by_id(&self, organization_id: Uuid, membership_id: Uuid) -> AppResult<Option<Membership>> {
        let row = sqlx::query(
            "SELECT id, organization_id, user_id, role, custom_role_id, created_at FROM memberships WHERE organization_id = ? AND id = ?",
        )
        .bind(organization_id.to_string())
        .bind(membership_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_parsers::membership_from_row).transpose()
    }

    async fn list_memberships(&self, organization_id: Uuid) -> AppResult<Vec<Membership>> {
        let rows = sqlx::query(
            "SELECT id, organization_id, user_id, role, custom_role_id, created_at FROM memberships WHERE organization_id = ? ORDER BY created_at",
        )
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        parse_all(&rows, row_parsers::membership_from_row)
    }

    async fn count_memberships(&self, organization_id: Uuid) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM memberships WHERE organization_id = ?")
            .bind(organization_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn insert_membership_within(&self, membership: &Membership, limit: Limit) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO memberships (id, organization_id, user_id, role, custom_role_id, created_at)
            SELECT ?, ?, ?, ?, NULL, ?
            WHERE (SELECT COUNT(1) FROM memberships WHERE organization_id = ?) < ?
            "#,
        )
        .bind(membership.id.to_string())
        .bind(membership.organization_id.to_string())
        .bind(membership.user_id.to_string())
        .bind(membership.role.as_str())
        .bind(membership.created_at)
        .bind(membership.organization_id.to_string())
        .bind(limit_param(limit))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::on_unique(e, "user is already a member"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_member_role(&self, membership_id: Uuid, role: BuiltInRole) -> AppResult<()> {
        let result = sqlx::query("UPDATE memberships SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(membership_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::on_unique(e, "organization already has an owner"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("membership not found"));
        }
        Ok(())
    }

    async fn transfer_ownership(&self, organization_id: Uuid, from: Uuid, to: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Demote first: the single-owner index is checked per statement.
        for (membership_id, role) in [(from, BuiltInRole::Admin), (to, BuiltInRole::Owner)] {
            let result = sqlx::query("UPDATE memberships SET role = ? WHERE id = ? AND organization_id = ?")
                .bind(role.as_str())
                .bind(membership_id.to_string())
                .bind(organization_id.to_string())
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::not_found("membership not found"));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_membership(&self, membership: &Membership) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM permissions WHERE organization_id = ? AND user_id = ?")
            .bind(membership.organization_id.to_string())
            .bind(membership.user_id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM memberships WHERE id = ?")
            .bind(membership.id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for SqliteStore {
    async fn insert_role(&self, role: &CustomRole, grants: &[Grant]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO custom_roles (id, organization_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(role.id.to_string())
        .bind(role.organization_id.to_string())
        .bind(&role.name)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::on_unique(e, "role name already exists"))?;

        insert_role_grants(&mut tx, role, grants).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_role(&self, organization_id: Uuid, role_id: Uuid) -> AppResult<Option<CustomRole>> {
        let row = sqlx::query(
            "SELECT id, organization_id, name, created_at, updated_at FROM custom_roles WHERE organization_id = ? AND id = ?",
        )
        .bind(organization_id.to_string())
        .bind(role_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_parsers::role_from_row).transpose()
    }

    async fn list_roles(&self, organization_id: Uuid) -> AppResult<Vec<CustomRole>> {
        let rows = sqlx::query(
            "SELECT id, organization_id, name, created_at, updated_at FROM custom_roles WHERE organization_id = ? ORDER BY name",
        )
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        parse_all(&rows, row_parsers::role_from_row)
    }

    async fn role_permissions(&self, role_id: Uuid) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query(
            "SELECT id, organization_id, resource, actions, role_id, user_id, source_role_id, created_at FROM permissions WHERE role_id = ?",
        )
        .bind(role_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(sorted(parse_all(&rows, row_parsers::permission_from_row)?))
    }

    async fn replace_role(&self, role: &CustomRole, grants: &[Grant]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE custom_roles SET name = ?, updated_at = ? WHERE id = ? AND organization_id = ?")
            .bind(&role.name)
            .bind(role.updated_at)
            .bind(role.id.to_string())
            .bind(role.organization_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::on_unique(e, "role name already exists"))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("role not found"));
        }

        sqlx::query("DELETE FROM permissions WHERE role_id = ?")
            .bind(role.id.to_string())
            .execute(&mut *tx)
            .await?;
        insert_role_grants(&mut tx, role, grants).await?;

        sqlx::query("DELETE FROM permissions WHERE source_role_id = ? AND user_id IS NOT NULL")
            .bind(role.id.to_string())
            .execute(&mut *tx)
            .await?;

        let linked = sqlx::query("SELECT user_id FROM memberships WHERE custom_role_id = ?")
            .bind(role.id.to_string())
            .fetch_all(&mut *tx)
            .await?;
        for row in &linked {
            let user_id: String = row.try_get("user_id")?;
            let user_id = Uuid::parse_str(&user_id).map_err(|e| AppError::internal(format!("invalid uuid: {e}")))?;
            copy_role_grants(&mut tx, role.organization_id, user_id, role.id, grants).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_role(&self, organization_id: Uuid, role_id: Uuid) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM custom_roles WHERE id = ? AND organization_id = ?)")
            .bind(role_id.to_string())
            .bind(organization_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Ok(false);
        }

        sqlx::query("DELETE FROM permissions WHERE source_role_id = ? AND user_id IS NOT NULL")
            .bind(role_id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE memberships SET custom_role_id = NULL WHERE custom_role_id = ?")
            .bind(role_id.to_string())
            .execute(&mut *tx)
            .await?;

        // Role-owned permission rows go with the role (ON DELETE CASCADE).
        sqlx::query("DELETE FROM custom_roles WHERE id = ?")
            .bind(role_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl PermissionRepository for SqliteStore {
    async fn user_permissions(&self, organization_id: Uuid, user_id: Uuid) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query(
            r#"
            SELECT id, organization_id, resource, actions, role_id, user_id, source_role_id, created_at
            FROM permissions
            WHERE organization_id = ? AND user_id = ?
            "#,
        )
        .bind(organization_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(sorted(parse_all(&rows, row_parsers::permission_from_row)?))
    }

    async fn assign_role(&self, membership: &Membership, role_id: Option<Uuid>) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let grants = match role_id {
            Some(role_id) => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM custom_roles WHERE id = ? AND organization_id = ?)",
                )
                .bind(role_id.to_string())
                .bind(membership.organization_id.to_string())
                .fetch_one(&mut *tx)
                .await?;
                if !exists {
                    return Err(AppError::not_found("role not found"));
                }
                load_role_grants(&mut tx, role_id).await?
            }
            None => Vec::new(),
        };

        let result = sqlx::query("UPDATE memberships SET custom_role_id = ? WHERE id = ? AND organization_id = ?")
            .bind(role_id.map(|id| id.to_string()))
            .bind(membership.id.to_string())
            .bind(membership.organization_id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("membership not found"));
        }

        sqlx::query("DELETE FROM permissions WHERE organization_id = ? AND user_id = ?")
            .bind(membership.organization_id.to_string())
            .bind(membership.user_id.to_string())
            .execute(&mut *tx)
            .await?;

        if let Some(role_id) = role_id {
            copy_role_grants(&mut tx, membership.organization_id, membership.user_id, role_id, &grants).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_user_permission(&self, organization_id: Uuid, user_id: Uuid, grant: &Grant) -> AppResult<Permission> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, organization_id, resource, actions, user_id, source_role_id, created_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?)
            ON CONFLICT (organization_id, user_id, resource) WHERE user_id IS NOT NULL
            DO UPDATE SET actions = excluded.actions, source_role_id = NULL
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(organization_id.to_string())
        .bind(grant.resource.as_str())
        .bind(actions_json(&grant.actions)?)
        .bind(user_id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT id, organization_id, resource, actions, role_id, user_id, source_role_id, created_at
            FROM permissions
            WHERE organization_id = ? AND user_id = ? AND resource = ?
            "#,
        )
        .bind(organization_id.to_string())
        .bind(user_id.to_string())
        .bind(grant.resource.as_str())
        .fetch_one(&self.pool)
        .await?;

        row_parsers::permission_from_row(&row)
    }

    async fn delete_user_permission(&self, organization_id: Uuid, user_id: Uuid, resource: Resource) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE organization_id = ? AND user_id = ? AND resource = ?")
            .bind(organization_id.to_string())
            .bind(user_id.to_string())
            .bind(resource.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DomainRepository for SqliteStore {
    async fn list_domains(&self, organization_id: Uuid) -> AppResult<Vec<Domain>> {
        let rows = sqlx::query(
            "SELECT id, organization_id, hostname, created_at FROM domains WHERE organization_id = ? ORDER BY hostname",
        )
        .bind(organization_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        parse_all(&rows, row_parsers::domain_from_row)
    }

    async fn count_domains(&self, organization_id: Uuid) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM domains WHERE organization_id = ?")
            .bind(organization_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn insert_domain_within(&self, domain: &Domain, limit: Limit) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO domains (id, organization_id, hostname, created_at)
            SELECT ?, ?, ?, ?
            WHERE (SELECT COUNT(1) FROM domains WHERE organization_id = ?) < ?
            "#,
        )
        .bind(domain.id.to_string())
        .bind(domain.organization_id.to_string())
        .bind(&domain.hostname)
        .bind(domain.created_at)
        .bind(domain.organization_id.to_string())
        .bind(limit_param(limit))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::on_unique(e, "hostname already registered"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_domain(&self, organization_id: Uuid, domain_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM domains WHERE id = ? AND organization_id = ?")
            .bind(domain_id.to_string())
            .bind(organization_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
