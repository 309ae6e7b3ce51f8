//! Scoped transaction executor.
//!
//! Every tenant database operation runs inside [`TenantScope::with_tenant_scope`]:
//! one transaction whose first statement pins `search_path` to the tenant
//! schema followed by the shared schema. The path is set with `SET LOCAL`, so
//! it ends with the transaction and a pooled connection never carries it into
//! another tenant's work.

use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, error, warn};

use super::error::TenancyError;
use super::schema_name::{SchemaName, ScopePath};
use crate::config::{IsolationLevel, TenancyConfig};

tokio::task_local! {
    static ACTIVE_SCOPE: String;
}

/// Handle passed to a unit of work. Queries issued through [`conn`] resolve
/// unqualified names against the tenant schema, then the shared schema.
///
/// [`conn`]: ScopedTransaction::conn
pub struct ScopedTransaction {
    tx: Transaction<'static, Postgres>,
    scope: ScopePath,
    tenant_id: Option<String>,
}

impl ScopedTransaction {
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }

    /// `None` inside a shared-only scope.
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn schema(&self) -> &SchemaName {
        self.scope.primary()
    }

    pub fn is_shared_only(&self) -> bool {
        self.scope.tenant_schema().is_none()
    }
}

/// Runs units of work inside a scoped transaction.
///
/// A unit of work borrows the [`ScopedTransaction`] for its whole lifetime and
/// returns its own error type; the executor only needs to build that type from
/// a [`TenancyError`]. Errors from the unit of work come back unchanged after
/// the transaction has been rolled back.
pub trait TenantScope: Send + Sync {
    fn with_tenant_scope<'a, T, E, F>(
        &'a self,
        tenant_id: Option<&'a str>,
        work: F,
    ) -> BoxFuture<'a, Result<T, E>>
    where
        T: Send + 'a,
        E: From<TenancyError> + Send + 'a,
        F: for<'t> FnOnce(&'t mut ScopedTransaction) -> BoxFuture<'t, Result<T, E>> + Send + 'a;

    /// Cross-tenant access limited to the shared schema.
    fn with_shared_scope<'a, T, E, F>(&'a self, work: F) -> BoxFuture<'a, Result<T, E>>
    where
        T: Send + 'a,
        E: From<TenancyError> + Send + 'a,
        F: for<'t> FnOnce(&'t mut ScopedTransaction) -> BoxFuture<'t, Result<T, E>> + Send + 'a;
}

/// PostgreSQL implementation over the shared connection pool.
#[derive(Clone)]
pub struct PgScopedExecutor {
    pool: PgPool,
    schema_prefix: String,
    shared: SchemaName,
    timeout: Duration,
    isolation: IsolationLevel,
}

impl PgScopedExecutor {
    pub fn new(pool: PgPool, config: &TenancyConfig) -> Result<Self, TenancyError> {
        Ok(Self {
            pool,
            schema_prefix: config.schema_prefix.clone(),
            shared: SchemaName::shared(&config.shared_schema)?,
            timeout: Duration::from_millis(config.transaction_timeout_ms),
            isolation: config.isolation_level,
        })
    }

    pub fn schema_for(&self, tenant_id: &str) -> Result<SchemaName, TenancyError> {
        SchemaName::for_tenant(&self.schema_prefix, tenant_id)
    }

    pub fn shared_schema(&self) -> &SchemaName {
        &self.shared
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run<T, E, F>(&self, scope: ScopePath, tenant_id: Option<String>, work: F) -> Result<T, E>
    where
        T: Send,
        E: From<TenancyError> + Send,
        F: for<'t> FnOnce(&'t mut ScopedTransaction) -> BoxFuture<'t, Result<T, E>> + Send,
    {
        if ACTIVE_SCOPE.try_with(|_| ()).is_ok() {
            error!(schema = %scope.primary(), "scoped transaction requested inside another scoped transaction");
            return Err(TenancyError::NestedScope.into());
        }

        // Pool acquisition is bounded by the pool's own acquire timeout and
        // reports as an infrastructure error, not a transaction timeout.
        let tx = self.pool.begin().await.map_err(TenancyError::from)?;

        let schema = scope.primary().to_string();
        let attempt = ACTIVE_SCOPE.scope(schema.clone(), self.execute(tx, scope, tenant_id, work));

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                // Dropping the attempt drops the transaction, which rolls it back.
                warn!(
                    schema = %schema,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "scoped transaction timed out and was rolled back"
                );
                Err(TenancyError::TransactionTimeout.into())
            }
        }
    }

    async fn execute<T, E, F>(
        &self,
        mut tx: Transaction<'static, Postgres>,
        scope: ScopePath,
        tenant_id: Option<String>,
        work: F,
    ) -> Result<T, E>
    where
        T: Send,
        E: From<TenancyError> + Send,
        F: for<'t> FnOnce(&'t mut ScopedTransaction) -> BoxFuture<'t, Result<T, E>> + Send,
    {
        if let Err(err) = self.establish(&mut tx, &scope).await {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("rollback after scope failure did not complete: {}", rollback_err);
            }
            return Err(err.into());
        }
        debug!(schema = %scope.primary(), "scoped transaction started");

        let mut handle = ScopedTransaction { tx, scope, tenant_id };

        match work(&mut handle).await {
            Ok(value) => {
                handle.tx.commit().await.map_err(TenancyError::from)?;
                debug!(schema = %handle.scope.primary(), "scoped transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = handle.tx.rollback().await {
                    warn!("rollback after failed unit of work did not complete: {}", rollback_err);
                }
                debug!(schema = %handle.scope.primary(), "scoped transaction rolled back");
                Err(err)
            }
        }
    }

    /// Scope first, then the other transaction-local settings, then a check
    /// that the primary schema actually resolved. PostgreSQL silently skips
    /// missing schemas in `search_path`, so the check is what catches a tenant
    /// whose schema was never provisioned.
    async fn establish(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        scope: &ScopePath,
    ) -> Result<(), TenancyError> {
        sqlx::query(&scope.set_local_statement())
            .execute(&mut **tx)
            .await
            .map_err(|e| TenancyError::SchemaContext(Some(e)))?;

        let isolation = format!("SET TRANSACTION ISOLATION LEVEL {}", self.isolation.as_sql());
        sqlx::query(&isolation).execute(&mut **tx).await?;

        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(self.timeout.as_millis().to_string())
            .execute(&mut **tx)
            .await?;

        let established: bool = sqlx::query_scalar("SELECT $1 = ANY(current_schemas(false)::text[])")
            .bind(scope.primary().as_str())
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| TenancyError::SchemaContext(Some(e)))?;

        if !established {
            error!(schema = %scope.primary(), "schema missing from search path; check tenant provisioning");
            return Err(TenancyError::SchemaContext(None));
        }
        Ok(())
    }
}

impl TenantScope for PgScopedExecutor {
    fn with_tenant_scope<'a, T, E, F>(
        &'a self,
        tenant_id: Option<&'a str>,
        work: F,
    ) -> BoxFuture<'a, Result<T, E>>
    where
        T: Send + 'a,
        E: From<TenancyError> + Send + 'a,
        F: for<'t> FnOnce(&'t mut ScopedTransaction) -> BoxFuture<'t, Result<T, E>> + Send + 'a,
    {
        Box::pin(async move {
            let tenant_id = match tenant_id {
                Some(id) if !id.is_empty() => id,
                _ => {
                    warn!(target: "tenancy::security", "scoped transaction requested without tenant context");
                    return Err(TenancyError::MissingTenantContext.into());
                }
            };
            let schema = self.schema_for(tenant_id)?;
            let scope = ScopePath::tenant(schema, self.shared.clone());
            self.run(scope, Some(tenant_id.to_string()), work).await
        })
    }

    fn with_shared_scope<'a, T, E, F>(&'a self, work: F) -> BoxFuture<'a, Result<T, E>>
    where
        T: Send + 'a,
        E: From<TenancyError> + Send + 'a,
        F: for<'t> FnOnce(&'t mut ScopedTransaction) -> BoxFuture<'t, Result<T, E>> + Send + 'a,
    {
        Box::pin(async move {
            let scope = ScopePath::shared_only(self.shared.clone());
            self.run(scope, None, work).await
        })
    }
}
