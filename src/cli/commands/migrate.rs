#![allow(deprecated)]

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde_json::json;
use sqlx::Executor;
use tracing::{info, warn};

use crate::cli::legacy;
use crate::cli::utils::*;
use crate::cli::CliContext;
use crate::database::models::Tenant;
use crate::database::DatabaseManager;
use crate::services::TenantDirectory;
use crate::tenancy::{TenancyError, TenantScope};

#[derive(Args)]
pub struct MigrateArgs {
    #[arg(long, help = "SQL file applied inside each tenant schema")]
    pub file: PathBuf,

    #[arg(long, help = "Clear per-tenant database descriptors after a successful run")]
    pub retire_legacy: bool,
}

/// Apply one SQL file to every active tenant, each in its own scoped
/// transaction. A failing tenant is reported and skipped; the others still
/// run.
pub async fn handle(args: MigrateArgs, ctx: &CliContext) -> anyhow::Result<()> {
    let sql = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;

    let tenants: Vec<Tenant> = ctx
        .directory
        .list_all()
        .await?
        .into_iter()
        .filter(|t| t.is_active)
        .collect();

    let mut applied = Vec::new();
    let mut failed = Vec::new();

    for tenant in &tenants {
        if tenant.database_url.is_some() {
            check_legacy_descriptor(ctx, tenant).await?;
        }

        let statements = sql.clone();
        let result = ctx
            .executor
            .with_tenant_scope(Some(&tenant.id), move |tx| {
                Box::pin(async move {
                    tx.conn().execute(statements.as_str()).await?;
                    Ok::<_, TenancyError>(())
                })
            })
            .await;

        match result {
            Ok(()) => {
                info!(tenant = %tenant.slug, "migration applied");
                applied.push(tenant.slug.clone());
            }
            Err(e) => {
                warn!(tenant = %tenant.slug, "migration failed: {}", e);
                failed.push(json!({ "tenant": tenant.slug, "error": e.to_string() }));
            }
        }
    }

    if args.retire_legacy && failed.is_empty() {
        let retired = retire_descriptors(ctx).await?;
        info!(retired, "legacy database descriptors cleared");
    }

    let message = format!(
        "Migrated {} of {} tenants from {}",
        applied.len(),
        tenants.len(),
        args.file.display()
    );
    output_success(&ctx.output, &message, Some(json!({ "applied": applied, "failed": failed })))?;

    if !failed.is_empty() {
        anyhow::bail!("{} tenant(s) failed to migrate", failed.len());
    }
    Ok(())
}

/// A tenant still carrying a per-tenant database URL is now served by the
/// shared database. Confirm that the URL it resolves to is reachable before
/// migrating it.
async fn check_legacy_descriptor(ctx: &CliContext, tenant: &Tenant) -> anyhow::Result<()> {
    let resolved = legacy::tenant_database_url(&ctx.database_url, tenant);
    let pool = legacy::connect_tenant(&ctx.database, tenant);
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .with_context(|| format!("legacy descriptor for '{}' is unreachable", tenant.slug))?;
    legacy::disconnect_tenant(tenant).await;

    info!(
        tenant = %tenant.slug,
        database = %DatabaseManager::redact(&resolved),
        "legacy descriptor resolves to the shared database"
    );
    Ok(())
}

async fn retire_descriptors(ctx: &CliContext) -> anyhow::Result<u64> {
    let cleared = ctx
        .executor
        .with_shared_scope(|tx| {
            Box::pin(async move {
                let result = sqlx::query(
                    "UPDATE tenants SET database_url = NULL, updated_at = now() WHERE database_url IS NOT NULL",
                )
                .execute(tx.conn())
                .await?;
                Ok::<_, TenancyError>(result.rows_affected())
            })
        })
        .await?;
    Ok(cleared)
}
