#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use storefront_tenancy::app::{app, AppState};
use storefront_tenancy::cli::commands::user::{add_user, NewUser};
use storefront_tenancy::cli::provision::{drop_tenant, ensure_shared_tables, generate_tenant_id, provision_tenant, NewTenant};
use storefront_tenancy::config::{AppConfig, TenancyConfig};
use storefront_tenancy::database::models::User;
use storefront_tenancy::database::DatabaseManager;
use storefront_tenancy::tenancy::PgScopedExecutor;

/// Connection to the test database, or `None` when `DATABASE_URL` is unset
/// and the calling test should return early.
pub struct TestDb {
    pub url: String,
    pub config: AppConfig,
    pub database: DatabaseManager,
    pub executor: Arc<PgScopedExecutor>,
}

#[derive(Debug, Clone)]
pub struct TestTenant {
    pub id: String,
    pub slug: String,
}

pub async fn test_db() -> Option<TestDb> {
    let _ = dotenvy::dotenv();
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return None;
    };

    let config = AppConfig::from_env();
    let database = DatabaseManager::connect(&url, &config.database)
        .await
        .expect("DATABASE_URL is set but the database is unreachable");
    ensure_shared_tables(database.pool(), &config.tenancy)
        .await
        .expect("failed to create shared tables");
    let executor = Arc::new(PgScopedExecutor::new(database.pool().clone(), &config.tenancy).expect("tenancy config"));

    Some(TestDb {
        url,
        config,
        database,
        executor,
    })
}

impl TestDb {
    pub fn pool(&self) -> &PgPool {
        self.database.pool()
    }

    /// Executor over the same pool with different tenancy settings.
    pub fn executor_with(&self, adjust: impl FnOnce(&mut TenancyConfig)) -> PgScopedExecutor {
        let mut tenancy = self.config.tenancy.clone();
        adjust(&mut tenancy);
        PgScopedExecutor::new(self.pool().clone(), &tenancy).expect("tenancy config")
    }

    /// Provision a tenant with a unique slug derived from `label`.
    pub async fn provision(&self, label: &str) -> Result<TestTenant> {
        let suffix = generate_tenant_id();
        let tenant = provision_tenant(
            self.pool(),
            &self.config.tenancy,
            NewTenant {
                id: Some(format!("t{}", suffix)),
                slug: format!("{}-{}", label, &suffix[..8]),
                name: label.to_string(),
            },
        )
        .await
        .with_context(|| format!("provisioning {}", label))?;

        Ok(TestTenant {
            id: tenant.id,
            slug: tenant.slug,
        })
    }

    pub async fn add_user(&self, tenant: &TestTenant, auth: &str, role: &str, password: &str) -> Result<User> {
        add_user(
            &self.executor,
            &tenant.id,
            NewUser {
                auth: auth.to_string(),
                name: auth.to_string(),
                role: role.to_string(),
                password: password.to_string(),
            },
        )
        .await
    }

    pub async fn set_active(&self, tenant: &TestTenant, active: bool) -> Result<()> {
        sqlx::query("UPDATE tenants SET is_active = $2 WHERE id = $1")
            .bind(&tenant.id)
            .bind(active)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn cleanup(&self, tenants: &[&TestTenant]) {
        for tenant in tenants {
            if let Err(e) = drop_tenant(self.pool(), &self.config.tenancy, &tenant.slug).await {
                eprintln!("cleanup of {} failed: {e:#}", tenant.slug);
            }
        }
    }

    /// Serve the full router on an ephemeral port and return its base URL.
    pub async fn spawn_server(&self) -> Result<String> {
        let state = AppState::new(self.config.clone(), self.database.clone())?;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app(state)).await {
                eprintln!("test server stopped: {e}");
            }
        });

        Ok(format!("http://{}", addr))
    }
}
