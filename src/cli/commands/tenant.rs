use anyhow::anyhow;
use clap::Subcommand;
use serde_json::json;

use crate::cli::provision::{drop_tenant, provision_tenant, NewTenant};
use crate::cli::utils::*;
use crate::cli::{CliContext, OutputFormat};
use crate::database::models::Tenant;
use crate::services::TenantDirectory;
use crate::tenancy::{TenancyError, TenantScope};

const TENANT_COLUMNS: &str = "id, slug, name, is_active, database_url, created_at, updated_at";

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "Create a tenant schema and register the tenant")]
    Provision {
        #[arg(help = "Tenant slug used at login")]
        slug: String,

        #[arg(long, help = "Display name (defaults to the slug)")]
        name: Option<String>,

        #[arg(long, help = "Internal tenant id (generated when omitted)")]
        id: Option<String>,
    },

    #[command(about = "List all tenants, including suspended ones")]
    List,

    #[command(about = "Show one tenant")]
    Show {
        #[arg(help = "Tenant slug")]
        slug: String,
    },

    #[command(about = "Suspend a tenant; its sessions stop resolving")]
    Suspend {
        #[arg(help = "Tenant slug")]
        slug: String,
    },

    #[command(about = "Reactivate a suspended tenant")]
    Resume {
        #[arg(help = "Tenant slug")]
        slug: String,
    },

    #[command(about = "Drop a tenant schema and its directory entry")]
    Drop {
        #[arg(help = "Tenant slug")]
        slug: String,

        #[arg(long, help = "Required confirmation")]
        yes: bool,
    },
}

pub async fn handle(cmd: TenantCommands, ctx: &CliContext) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::Provision { slug, name, id } => {
            let new = NewTenant {
                id,
                name: name.unwrap_or_else(|| slug.clone()),
                slug,
            };
            let tenant = provision_tenant(ctx.database.pool(), &ctx.config.tenancy, new).await?;
            let schema = ctx.executor.schema_for(&tenant.id)?;
            output_success(
                &ctx.output,
                &format!("Provisioned tenant '{}' in schema {}", tenant.slug, schema),
                Some(json!({ "tenant": tenant, "schema": schema.as_str() })),
            )
        }
        TenantCommands::List => {
            let tenants = ctx.directory.list_all().await?;
            if tenants.is_empty() {
                return output_empty_collection(&ctx.output, "tenants", "No tenants provisioned");
            }

            match ctx.output {
                OutputFormat::Json => output_json(&json!({ "tenants": tenants })),
                OutputFormat::Text => {
                    println!("{:<16} {:<20} {:<24} {:<8} {}", "ID", "SLUG", "NAME", "ACTIVE", "CREATED");
                    println!("{}", "-".repeat(90));
                    for t in &tenants {
                        println!(
                            "{:<16} {:<20} {:<24} {:<8} {}",
                            t.id,
                            t.slug,
                            t.name,
                            if t.is_active { "yes" } else { "no" },
                            t.created_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                    Ok(())
                }
            }
        }
        TenantCommands::Show { slug } => {
            let tenant = find_any(ctx, &slug).await?;
            match ctx.output {
                OutputFormat::Json => output_json(&json!({ "tenant": tenant })),
                OutputFormat::Text => {
                    println!("Tenant: {}", tenant.slug);
                    println!("ID: {}", tenant.id);
                    println!("Name: {}", tenant.name);
                    println!("Schema: {}", ctx.executor.schema_for(&tenant.id)?);
                    println!("Active: {}", tenant.is_active);
                    if tenant.database_url.is_some() {
                        println!("Legacy descriptor: present");
                    }
                    Ok(())
                }
            }
        }
        TenantCommands::Suspend { slug } => {
            set_active(ctx, &slug, false).await?;
            output_success(&ctx.output, &format!("Suspended tenant '{}'", slug), None)
        }
        TenantCommands::Resume { slug } => {
            set_active(ctx, &slug, true).await?;
            output_success(&ctx.output, &format!("Resumed tenant '{}'", slug), None)
        }
        TenantCommands::Drop { slug, yes } => {
            if !yes {
                return Err(anyhow!("refusing to drop tenant '{}' without --yes", slug));
            }
            if !drop_tenant(ctx.database.pool(), &ctx.config.tenancy, &slug).await? {
                return Err(anyhow!("Tenant '{}' not found", slug));
            }
            output_success(&ctx.output, &format!("Dropped tenant '{}'", slug), None)
        }
    }
}

/// Lookup that also sees suspended tenants, unlike the directory's
/// `find_by_slug`.
async fn find_any(ctx: &CliContext, slug: &str) -> anyhow::Result<Tenant> {
    let slug_owned = slug.to_string();
    let sql = format!("SELECT {} FROM tenants WHERE slug = $1", TENANT_COLUMNS);
    let tenant = ctx
        .executor
        .with_shared_scope(move |tx| {
            Box::pin(async move {
                let row = sqlx::query_as::<_, Tenant>(&sql)
                    .bind(&slug_owned)
                    .fetch_optional(tx.conn())
                    .await?;
                Ok::<_, TenancyError>(row)
            })
        })
        .await?;
    tenant.ok_or_else(|| anyhow!("Tenant '{}' not found", slug))
}

async fn set_active(ctx: &CliContext, slug: &str, active: bool) -> anyhow::Result<()> {
    let slug_owned = slug.to_string();
    let updated = ctx
        .executor
        .with_shared_scope(move |tx| {
            Box::pin(async move {
                let result = sqlx::query("UPDATE tenants SET is_active = $2, updated_at = now() WHERE slug = $1")
                    .bind(&slug_owned)
                    .bind(active)
                    .execute(tx.conn())
                    .await?;
                Ok::<_, TenancyError>(result.rows_affected())
            })
        })
        .await?;

    if updated == 0 {
        return Err(anyhow!("Tenant '{}' not found", slug));
    }
    tracing::info!(tenant = %slug, active, "tenant activation changed");
    Ok(())
}
