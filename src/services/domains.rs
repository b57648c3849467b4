use uuid::Uuid;

use crate::authz::require_permission;
use crate::errors::{AppError, AppResult};
use crate::models::domain::Domain;
use crate::models::rbac::{Action, Resource};
use crate::plans::insert_domain_gated;
use crate::store::Store;
use crate::utils::utc_now;

fn normalize_hostname(hostname: &str) -> AppResult<String> {
    let hostname = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
    let labels_ok = hostname.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    if hostname.len() > 253 || !hostname.contains('.') || !labels_ok {
        return Err(AppError::bad_request(format!("invalid hostname: {hostname}")));
    }
    Ok(hostname)
}

pub async fn create_domain<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    hostname: &str,
) -> AppResult<Domain> {
    require_permission(store, actor_id, organization_id, Resource::Domains, Action::Create).await?;

    let domain = Domain {
        id: Uuid::new_v4(),
        organization_id,
        hostname: normalize_hostname(hostname)?,
        created_at: utc_now(),
    };
    insert_domain_gated(store, &domain).await?;

    tracing::info!(%organization_id, hostname = %domain.hostname, "domain created");
    Ok(domain)
}

pub async fn list_domains<S: Store + ?Sized>(store: &S, actor_id: Uuid, organization_id: Uuid) -> AppResult<Vec<Domain>> {
    require_permission(store, actor_id, organization_id, Resource::Domains, Action::Read).await?;
    store.list_domains(organization_id).await
}

pub async fn delete_domain<S: Store + ?Sized>(
    store: &S,
    actor_id: Uuid,
    organization_id: Uuid,
    domain_id: Uuid,
) -> AppResult<Domain> {
    require_permission(store, actor_id, organization_id, Resource::Domains, Action::Delete).await?;

    let domain = store
        .list_domains(organization_id)
        .await?
        .into_iter()
        .find(|d| d.id == domain_id)
        .ok_or_else(|| AppError::not_found("domain not found"))?;

    if !store.delete_domain(organization_id, domain_id).await? {
        return Err(AppError::not_found("domain not found"));
    }
    Ok(domain)
}
