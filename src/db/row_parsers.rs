use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::domain::Domain;
use crate::models::membership::Membership;
use crate::models::organization::Organization;
use crate::models::rbac::{Action, CustomRole, Permission, PermissionSubject};
use crate::models::user::DbUser;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // sqlx's chrono encoding and SQLite's CURRENT_TIMESTAMP both use a space separator
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, AppError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AppError::internal(format!("missing {}: {}", name, e)))
}

fn uuid_column(row: &SqliteRow, name: &str) -> Result<Uuid, AppError> {
    let raw: String = column(row, name)?;
    Uuid::parse_str(&raw).map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", name, e)))
}

fn opt_uuid_column(row: &SqliteRow, name: &str) -> Result<Option<Uuid>, AppError> {
    let raw: Option<String> = column(row, name)?;
    raw.map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| AppError::internal(format!("invalid uuid in {}: {}", name, e)))
}

fn datetime_column(row: &SqliteRow, name: &str) -> Result<DateTime<Utc>, AppError> {
    let raw: String = column(row, name)?;
    parse_datetime(&raw)
}

pub fn user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    Ok(DbUser {
        id: uuid_column(row, "id")?,
        name: column(row, "name")?,
        email: column(row, "email")?,
        avatar_url: column(row, "avatar_url")?,
        password_hash: column(row, "password_hash")?,
        created_at: datetime_column(row, "created_at")?,
        updated_at: datetime_column(row, "updated_at")?,
    })
}

pub fn organization_from_row(row: &SqliteRow) -> Result<Organization, AppError> {
    let plan: String = column(row, "plan")?;

    Ok(Organization {
        id: uuid_column(row, "id")?,
        slug: column(row, "slug")?,
        name: column(row, "name")?,
        plan: plan.parse().map_err(|_| AppError::internal(format!("invalid plan: {}", plan)))?,
        billing_customer_id: column(row, "billing_customer_id")?,
        billing_subscription_id: column(row, "billing_subscription_id")?,
        created_at: datetime_column(row, "created_at")?,
        updated_at: datetime_column(row, "updated_at")?,
    })
}

pub fn membership_from_row(row: &SqliteRow) -> Result<Membership, AppError> {
    let role: String = column(row, "role")?;

    Ok(Membership {
        id: uuid_column(row, "id")?,
        organization_id: uuid_column(row, "organization_id")?,
        user_id: uuid_column(row, "user_id")?,
        role: role.parse().map_err(|_| AppError::internal(format!("invalid role: {}", role)))?,
        custom_role_id: opt_uuid_column(row, "custom_role_id")?,
        created_at: datetime_column(row, "created_at")?,
    })
}

pub fn role_from_row(row: &SqliteRow) -> Result<CustomRole, AppError> {
    Ok(CustomRole {
        id: uuid_column(row, "id")?,
        organization_id: uuid_column(row, "organization_id")?,
        name: column(row, "name")?,
        created_at: datetime_column(row, "created_at")?,
        updated_at: datetime_column(row, "updated_at")?,
    })
}

pub fn permission_from_row(row: &SqliteRow) -> Result<Permission, AppError> {
    let resource: String = column(row, "resource")?;
    let actions: String = column(row, "actions")?;
    let actions: BTreeSet<Action> = serde_json::from_str(&actions)
        .map_err(|e| AppError::internal(format!("invalid actions: {}", e)))?;

    let subject = match (opt_uuid_column(row, "role_id")?, opt_uuid_column(row, "user_id")?) {
        (Some(role_id), None) => PermissionSubject::Role { role_id },
        (None, Some(user_id)) => PermissionSubject::User {
            user_id,
            source_role_id: opt_uuid_column(row, "source_role_id")?,
        },
        _ => return Err(AppError::internal("permission row must reference exactly one of role or user")),
    };

    Ok(Permission {
        id: uuid_column(row, "id")?,
        organization_id: uuid_column(row, "organization_id")?,
        resource: resource
            .parse()
            .map_err(|_| AppError::internal(format!("invalid resource: {}", resource)))?,
        actions,
        subject,
        created_at: datetime_column(row, "created_at")?,
    })
}

pub fn domain_from_row(row: &SqliteRow) -> Result<Domain, AppError> {
    Ok(Domain {
        id: uuid_column(row, "id")?,
        organization_id: uuid_column(row, "organization_id")?,
        hostname: column(row, "hostname")?,
        created_at: datetime_column(row, "created_at")?,
    })
}

/// Parses every row with `parse`, stopping at the first malformed one.
pub fn parse_all<T>(
    rows: &[SqliteRow],
    parse: impl Fn(&SqliteRow) -> Result<T, AppError>,
) -> Result<Vec<T>, AppError> {
    rows.iter().map(parse).collect()
}
