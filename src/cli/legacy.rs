//! Helpers from the one-database-per-tenant layout.
//!
//! Tenants now share one pool and are separated by schema, so these only keep
//! old maintenance flows working while `tenants.database_url` descriptors are
//! retired. Visibility stops at `crate::cli`; request handlers cannot reach
//! them. Every call logs a warning under `tenancy::legacy`.

#![allow(deprecated)]

use sqlx::PgPool;
use tracing::warn;

use crate::database::models::Tenant;
use crate::database::DatabaseManager;

/// Returns the shared pool. The caller gets NO tenant scoping; tenant data
/// must still go through `TenantScope::with_tenant_scope`.
#[deprecated(note = "tenants share one pool; use TenantScope::with_tenant_scope")]
pub(in crate::cli) fn connect_tenant(database: &DatabaseManager, tenant: &Tenant) -> PgPool {
    warn!(
        target: "tenancy::legacy",
        tenant = %tenant.slug,
        "connect_tenant is deprecated; returning the shared unscoped pool"
    );
    database.pool().clone()
}

/// No-op: the shared pool outlives every tenant.
#[deprecated(note = "tenants share one pool; nothing to disconnect")]
pub(in crate::cli) async fn disconnect_tenant(tenant: &Tenant) {
    warn!(
        target: "tenancy::legacy",
        tenant = %tenant.slug,
        "disconnect_tenant is deprecated and does nothing"
    );
}

/// The URL a legacy descriptor now resolves to: always the shared database.
#[deprecated(note = "per-tenant database URLs are retired")]
pub(in crate::cli) fn tenant_database_url(shared_database_url: &str, tenant: &Tenant) -> String {
    warn!(
        target: "tenancy::legacy",
        tenant = %tenant.slug,
        has_descriptor = tenant.database_url.is_some(),
        "tenant_database_url is deprecated; returning the shared database URL"
    );
    shared_database_url.to_string()
}
