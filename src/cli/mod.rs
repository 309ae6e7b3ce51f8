//! `tenantctl`: maintenance commands run by operators, outside the request
//! path. Provisioning, user seeding, token minting and schema migration.

pub mod commands;
mod legacy;
pub mod provision;
pub mod utils;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::{config, AppConfig};
use crate::database::DatabaseManager;
use crate::services::PgTenantDirectory;
use crate::tenancy::PgScopedExecutor;

#[derive(Parser)]
#[command(name = "tenantctl")]
#[command(about = "Tenant maintenance for the storefront API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(long, global = true, help = "Database URL (defaults to DATABASE_URL)")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Tenant provisioning and lifecycle")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },

    #[command(about = "Tenant-local user management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Session token minting")]
    Token {
        #[command(subcommand)]
        cmd: commands::token::TokenCommands,
    },

    #[command(about = "Apply a SQL file to every active tenant schema")]
    Migrate(commands::migrate::MigrateArgs),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Shared handles for every command. The pool connects lazily, so commands
/// that never touch the database (superadmin token minting) work offline.
pub struct CliContext {
    pub config: &'static AppConfig,
    pub database_url: String,
    pub database: DatabaseManager,
    pub executor: Arc<PgScopedExecutor>,
    pub directory: PgTenantDirectory,
    pub output: OutputFormat,
}

impl CliContext {
    pub fn new(database_url: String, output: OutputFormat) -> anyhow::Result<Self> {
        let config = config();
        config.validate()?;
        let database = DatabaseManager::connect_lazy(&database_url, &config.database)?;
        let executor = Arc::new(PgScopedExecutor::new(database.pool().clone(), &config.tenancy)?);
        let directory = PgTenantDirectory::new(executor.clone());

        Ok(Self {
            config,
            database_url,
            database,
            executor,
            directory,
            output,
        })
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output = OutputFormat::from_cli(&cli);
    let database_url = match cli.database_url {
        Some(url) => url,
        None => DatabaseManager::database_url_from_env()?,
    };
    let ctx = CliContext::new(database_url, output)?;

    let result = match cli.command {
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, &ctx).await,
        Commands::User { cmd } => commands::user::handle(cmd, &ctx).await,
        Commands::Token { cmd } => commands::token::handle(cmd, &ctx).await,
        Commands::Migrate(args) => commands::migrate::handle(args, &ctx).await,
    };

    ctx.database.close().await;
    result
}
