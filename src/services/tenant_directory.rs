use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::database::models::Tenant;
use crate::tenancy::{PgScopedExecutor, TenancyError, TenantScope};

const TENANT_COLUMNS: &str = "id, slug, name, is_active, database_url, created_at, updated_at";

/// Lookup of tenants in the shared schema.
///
/// Inactive tenants are reported exactly like missing ones so that callers
/// cannot reveal whether a suspended tenant exists.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Login-time lookup by the human slug.
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, TenancyError>;

    /// Re-validation of an id carried by a session.
    async fn find_by_id(&self, tenant_id: &str) -> Result<Option<Tenant>, TenancyError>;

    /// Every registered tenant, active or not. Superadmin use only.
    async fn list_all(&self) -> Result<Vec<Tenant>, TenancyError>;
}

/// Directory backed by the shared `tenants` table. Lookups run in a
/// shared-only scope, so tenant schemas are never consulted.
#[derive(Clone)]
pub struct PgTenantDirectory {
    executor: Arc<PgScopedExecutor>,
}

impl PgTenantDirectory {
    pub fn new(executor: Arc<PgScopedExecutor>) -> Self {
        Self { executor }
    }

    async fn find_one(&self, column: &'static str, value: &str) -> Result<Option<Tenant>, TenancyError> {
        let sql = format!("SELECT {} FROM tenants WHERE {} = $1", TENANT_COLUMNS, column);
        let value = value.to_string();

        let tenant = self
            .executor
            .with_shared_scope(move |tx| {
                Box::pin(async move {
                    let row = sqlx::query_as::<_, Tenant>(&sql)
                        .bind(&value)
                        .fetch_optional(tx.conn())
                        .await?;
                    Ok::<_, TenancyError>(row)
                })
            })
            .await?;

        Ok(tenant.filter(|t| {
            if !t.is_active {
                debug!("tenant {} is inactive; treating as not found", t.id);
            }
            t.is_active
        }))
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, TenancyError> {
        self.find_one("slug", slug).await
    }

    async fn find_by_id(&self, tenant_id: &str) -> Result<Option<Tenant>, TenancyError> {
        self.find_one("id", tenant_id).await
    }

    async fn list_all(&self) -> Result<Vec<Tenant>, TenancyError> {
        let sql = format!("SELECT {} FROM tenants ORDER BY created_at", TENANT_COLUMNS);
        self.executor
            .with_shared_scope(move |tx| {
                Box::pin(async move {
                    let rows = sqlx::query_as::<_, Tenant>(&sql).fetch_all(tx.conn()).await?;
                    Ok::<_, TenancyError>(rows)
                })
            })
            .await
    }
}
