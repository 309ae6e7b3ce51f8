use anyhow::anyhow;
use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::cli::utils::*;
use crate::cli::CliContext;
use crate::database::models::User;
use crate::services::TenantDirectory;
use crate::tenancy::{PgScopedExecutor, TenancyError, TenantScope};

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create a user in a tenant")]
    Add {
        #[arg(long, help = "Tenant slug")]
        tenant: String,

        #[arg(long, help = "Login name")]
        auth: String,

        #[arg(long, help = "Display name (defaults to the login name)")]
        name: Option<String>,

        #[arg(long, default_value = "cashier", help = "Role, e.g. admin or cashier")]
        role: String,

        #[arg(long, help = "Initial password")]
        password: String,
    },
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub auth: String,
    pub name: String,
    pub role: String,
    pub password: String,
}

/// Insert a user into the tenant's own `users` table.
pub async fn add_user(executor: &PgScopedExecutor, tenant_id: &str, new: NewUser) -> anyhow::Result<User> {
    let password_hash = hash_password(&new.password)?;
    let user = executor
        .with_tenant_scope(Some(tenant_id), move |tx| {
            Box::pin(async move {
                let row = sqlx::query_as::<_, User>(
                    "INSERT INTO users (id, name, auth, role, password_hash)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING id, name, auth, role, password_hash, is_active",
                )
                .bind(Uuid::new_v4())
                .bind(&new.name)
                .bind(&new.auth)
                .bind(&new.role)
                .bind(&password_hash)
                .fetch_one(tx.conn())
                .await?;
                Ok::<_, TenancyError>(row)
            })
        })
        .await?;
    Ok(user)
}

pub async fn handle(cmd: UserCommands, ctx: &CliContext) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Add {
            tenant,
            auth,
            name,
            role,
            password,
        } => {
            let record = ctx
                .directory
                .find_by_slug(&tenant)
                .await?
                .ok_or_else(|| anyhow!("Tenant '{}' not found or suspended", tenant))?;

            let new = NewUser {
                name: name.unwrap_or_else(|| auth.clone()),
                auth,
                role,
                password,
            };
            let user = add_user(&ctx.executor, &record.id, new).await?;

            output_success(
                &ctx.output,
                &format!("Added user '{}' to tenant '{}'", user.auth, record.slug),
                Some(json!({ "user": user })),
            )
        }
    }
}
