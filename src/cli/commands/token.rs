use anyhow::anyhow;
use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims, MAX_JWT_EXPIRY_HOURS};
use crate::cli::utils::*;
use crate::cli::{CliContext, OutputFormat};
use crate::services::TenantDirectory;
use crate::tenancy::{TenancyError, TenantScope};

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Mint a session token for a tenant user or a superadmin")]
    Mint {
        #[arg(long, help = "Tenant slug", required_unless_present = "super_admin")]
        tenant: Option<String>,

        #[arg(long, help = "Login name of the tenant user", requires = "tenant")]
        user: Option<String>,

        #[arg(long, conflicts_with = "tenant", help = "Shared-schema-only superadmin session")]
        super_admin: bool,

        #[arg(
            long,
            value_parser = clap::value_parser!(u64).range(1..=MAX_JWT_EXPIRY_HOURS),
            help = "Validity in hours (defaults to configuration)"
        )]
        hours: Option<u64>,
    },
}

pub async fn handle(cmd: TokenCommands, ctx: &CliContext) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Mint {
            tenant,
            user,
            super_admin,
            hours,
        } => {
            let hours = hours.unwrap_or(ctx.config.security.jwt_expiry_hours);

            let claims = if super_admin {
                Claims::new(Uuid::new_v4(), None, true, hours)
            } else {
                let slug = tenant.ok_or_else(|| anyhow!("--tenant is required"))?;
                let login = user.ok_or_else(|| anyhow!("--user is required for tenant tokens"))?;
                let record = ctx
                    .directory
                    .find_by_slug(&slug)
                    .await?
                    .ok_or_else(|| anyhow!("Tenant '{}' not found or suspended", slug))?;

                let login_owned = login.clone();
                let user_id: Option<Uuid> = ctx
                    .executor
                    .with_tenant_scope(Some(&record.id), move |tx| {
                        Box::pin(async move {
                            let id = sqlx::query_scalar("SELECT id FROM users WHERE auth = $1 AND is_active")
                                .bind(&login_owned)
                                .fetch_optional(tx.conn())
                                .await?;
                            Ok::<_, TenancyError>(id)
                        })
                    })
                    .await?;
                let user_id = user_id.ok_or_else(|| anyhow!("User '{}' not found in tenant '{}'", login, slug))?;

                Claims::new(user_id, Some(record.id), false, hours)
            };

            let token = generate_jwt(&claims, &ctx.config.security.jwt_secret)?;
            match ctx.output {
                OutputFormat::Json => output_json(&json!({
                    "token": token,
                    "user_id": claims.sub,
                    "tenant_id": claims.tenant_id,
                    "is_super_admin": claims.is_super_admin,
                    "expires_at": claims.exp,
                })),
                OutputFormat::Text => {
                    println!("{}", token);
                    Ok(())
                }
            }
        }
    }
}
