use std::collections::HashSet;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use realty_authz::authz::check_permission;
use realty_authz::db::{self, SqliteStore};
use realty_authz::models::organization::BillingUpdate;
use realty_authz::models::plan::Plan;
use realty_authz::models::rbac::{Action, Resource};
use realty_authz::plans::usage_report;
use realty_authz::services::organizations;
use realty_authz::store::OrganizationRepository;

#[derive(Parser, Debug)]
#[command(author, version, about = "realty-authz operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    Migrate,
    /// Show migration status against the current database
    Status,
    /// Evaluate a permission for a user in an organization
    Check {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        org: Uuid,
        #[arg(long)]
        resource: Resource,
        #[arg(long)]
        action: Action,
    },
    /// Print live usage against the organization's plan limits
    Usage {
        #[arg(long)]
        org: Uuid,
    },
    /// Change an organization's plan, as the billing flow would
    SetPlan {
        #[arg(long)]
        org: Uuid,
        #[arg(long)]
        plan: Plan,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // When running in Docker the binary CWD may differ, so fall back to the
    // crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();
    let pool = get_pool().await?;

    match cli.command {
        Commands::Migrate => {
            sqlx::migrate!().run(&pool).await.context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Status => print_status(&pool).await?,
        Commands::Check {
            user,
            org,
            resource,
            action,
        } => {
            let store = SqliteStore::new(pool);
            let allowed = check_permission(&store, user, org, resource, action).await;
            println!("{}", if allowed { "allow" } else { "deny" });
        }
        Commands::Usage { org } => {
            let store = SqliteStore::new(pool);
            let organization = store
                .find_organization(org)
                .await?
                .with_context(|| format!("organization {org} not found"))?;
            let report = usage_report(&store, &organization).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::SetPlan { org, plan } => {
            let store = SqliteStore::new(pool);
            let current = store
                .find_organization(org)
                .await?
                .with_context(|| format!("organization {org} not found"))?;
            let billing = BillingUpdate {
                plan,
                billing_customer_id: current.billing_customer_id,
                billing_subscription_id: current.billing_subscription_id,
            };
            let updated = organizations::update_billing(&store, org, &billing).await?;
            println!("{} is now on {}", updated.slug, updated.plan);
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    db::connect(&database_url, 2).await
}

async fn print_status(pool: &SqlitePool) -> anyhow::Result<()> {
    let migrator = sqlx::migrate!();

    // If the migrations table doesn't exist, nothing is applied yet
    let has_table: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_one(pool)
            .await?;
    let applied_versions: HashSet<i64> = if has_table > 0 {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}
