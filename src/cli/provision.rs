//! Schema provisioning. This is the only code that creates or drops tenant
//! schemas; request handling never issues DDL.

use anyhow::{anyhow, Context};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::config::TenancyConfig;
use crate::database::models::Tenant;
use crate::tenancy::{SchemaName, ScopePath};

/// Serializes concurrent provisioning so `CREATE ... IF NOT EXISTS` on the
/// shared tables cannot race.
const PROVISION_LOCK: i64 = 0x7465_6e61_6e74;

const TENANT_COLUMNS: &str = "id, slug, name, is_active, database_url, created_at, updated_at";

const TENANT_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        auth TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS role_permissions (
        role TEXT NOT NULL,
        permission TEXT NOT NULL,
        PRIMARY KEY (role, permission)
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        sku TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        price_cents BIGINT NOT NULL CHECK (price_cents >= 0),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
];

const DEFAULT_ROLE_PERMISSIONS: &[(&str, &str)] = &[
    ("admin", "products:*"),
    ("cashier", "products:read"),
];

#[derive(Debug, Clone)]
pub struct NewTenant {
    /// Internal id; generated when absent.
    pub id: Option<String>,
    pub slug: String,
    pub name: String,
}

/// Short random id, always within the schema identifier allow-list.
pub fn generate_tenant_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}

fn validate_slug(slug: &str) -> anyhow::Result<()> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(anyhow!("slug must be lowercase letters, digits or '-': {:?}", slug));
    }
    Ok(())
}

/// Create the shared `tenants` table when missing.
pub async fn ensure_shared_tables(pool: &PgPool, tenancy: &TenancyConfig) -> anyhow::Result<()> {
    let shared = SchemaName::shared(&tenancy.shared_schema)?;
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(PROVISION_LOCK)
        .execute(&mut *tx)
        .await?;
    create_shared_tables(&mut tx, &shared).await?;
    tx.commit().await?;
    Ok(())
}

async fn create_shared_tables(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    shared: &SchemaName,
) -> anyhow::Result<()> {
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {}.tenants (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            database_url TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        shared.quoted()
    );
    sqlx::query(&ddl).execute(&mut **tx).await?;
    Ok(())
}

/// Register a tenant and build its schema in one transaction: shared tables,
/// the tenant schema, its tables and default role grants, then the directory
/// row. A failure at any step leaves nothing behind.
pub async fn provision_tenant(
    pool: &PgPool,
    tenancy: &TenancyConfig,
    new: NewTenant,
) -> anyhow::Result<Tenant> {
    validate_slug(&new.slug)?;
    let id = new.id.unwrap_or_else(generate_tenant_id);
    let shared = SchemaName::shared(&tenancy.shared_schema)?;
    let schema = SchemaName::for_tenant(&tenancy.schema_prefix, &id)?;

    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(PROVISION_LOCK)
        .execute(&mut *tx)
        .await?;

    create_shared_tables(&mut tx, &shared).await?;

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema.quoted()))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("creating schema {}", schema))?;

    let scope = ScopePath::tenant(schema.clone(), shared);
    sqlx::query(&scope.set_local_statement()).execute(&mut *tx).await?;

    for ddl in TENANT_TABLES {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }
    for &(role, permission) in DEFAULT_ROLE_PERMISSIONS {
        sqlx::query("INSERT INTO role_permissions (role, permission) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(role)
            .bind(permission)
            .execute(&mut *tx)
            .await?;
    }

    let sql = format!(
        "INSERT INTO tenants (id, slug, name) VALUES ($1, $2, $3) RETURNING {}",
        TENANT_COLUMNS
    );
    let tenant = sqlx::query_as::<_, Tenant>(&sql)
        .bind(&id)
        .bind(&new.slug)
        .bind(&new.name)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("registering tenant {:?}", new.slug))?;

    tx.commit().await?;
    info!(tenant = %tenant.slug, schema = %schema, "tenant provisioned");
    Ok(tenant)
}

/// Drop a tenant's schema and directory row. Returns false when no tenant
/// has the slug.
pub async fn drop_tenant(pool: &PgPool, tenancy: &TenancyConfig, slug: &str) -> anyhow::Result<bool> {
    let shared = SchemaName::shared(&tenancy.shared_schema)?;
    let mut tx = pool.begin().await?;

    let sql = format!("DELETE FROM {}.tenants WHERE slug = $1 RETURNING id", shared.quoted());
    let id: Option<String> = sqlx::query_scalar(&sql).bind(slug).fetch_optional(&mut *tx).await?;
    let Some(id) = id else {
        return Ok(false);
    };

    let schema = SchemaName::for_tenant(&tenancy.schema_prefix, &id)?;
    sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema.quoted()))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(tenant = %slug, schema = %schema, "tenant dropped");
    Ok(true)
}
