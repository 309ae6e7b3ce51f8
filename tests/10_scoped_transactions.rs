mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use storefront_tenancy::config::IsolationLevel;
use storefront_tenancy::tenancy::{PgScopedExecutor, TenancyError, TenantScope};

async fn insert_product(executor: &PgScopedExecutor, tenant_id: &str, sku: &str) -> Result<(), TenancyError> {
    let sku = sku.to_string();
    executor
        .with_tenant_scope(Some(tenant_id), move |tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO products (id, sku, name, price_cents) VALUES ($1, $2, $2, 100)")
                    .bind(Uuid::new_v4())
                    .bind(&sku)
                    .execute(tx.conn())
                    .await?;
                Ok::<_, TenancyError>(())
            })
        })
        .await
}

async fn product_skus(executor: &PgScopedExecutor, tenant_id: &str) -> Vec<String> {
    executor
        .with_tenant_scope(Some(tenant_id), |tx| {
            Box::pin(async move {
                let skus = sqlx::query_scalar("SELECT sku FROM products ORDER BY sku")
                    .fetch_all(tx.conn())
                    .await?;
                Ok::<_, TenancyError>(skus)
            })
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn unqualified_names_resolve_to_the_callers_tenant() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let globex = db.provision("globex").await.unwrap();

    insert_product(&db.executor, &acme.id, "ACME-1").await.unwrap();

    assert_eq!(product_skus(&db.executor, &acme.id).await, vec!["ACME-1".to_string()]);
    assert!(product_skus(&db.executor, &globex.id).await.is_empty());

    db.cleanup(&[&acme, &globex]).await;
}

#[tokio::test]
async fn scoped_handle_reports_its_search_path() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let expected = db.executor.schema_for(&acme.id).unwrap().as_str().to_string();
    let shared = db.executor.shared_schema().as_str().to_string();

    let (schemas, schema, shared_only) = db
        .executor
        .with_tenant_scope(Some(&acme.id), |tx| {
            Box::pin(async move {
                let schemas: Vec<String> = sqlx::query_scalar("SELECT current_schemas(false)::text[]")
                    .fetch_one(tx.conn())
                    .await?;
                Ok::<_, TenancyError>((schemas, tx.schema().as_str().to_string(), tx.is_shared_only()))
            })
        })
        .await
        .unwrap();

    assert_eq!(schemas, vec![expected.clone(), shared]);
    assert_eq!(schema, expected);
    assert!(!shared_only);

    db.cleanup(&[&acme]).await;
}

#[tokio::test]
async fn configured_isolation_level_applies_after_the_search_path() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let expected = db.executor.schema_for(&acme.id).unwrap().as_str().to_string();

    for (level, shown) in [
        (IsolationLevel::Serializable, "serializable"),
        (IsolationLevel::RepeatableRead, "repeatable read"),
        (IsolationLevel::ReadCommitted, "read committed"),
    ] {
        let executor = db.executor_with(|tenancy| tenancy.isolation_level = level);
        let (isolation, schema) = executor
            .with_tenant_scope(Some(&acme.id), |tx| {
                Box::pin(async move {
                    let isolation: String = sqlx::query_scalar("SHOW transaction_isolation")
                        .fetch_one(tx.conn())
                        .await?;
                    let schema: String = sqlx::query_scalar("SELECT current_schema()::text")
                        .fetch_one(tx.conn())
                        .await?;
                    Ok::<_, TenancyError>((isolation, schema))
                })
            })
            .await
            .unwrap();

        assert_eq!(isolation, shown);
        assert_eq!(schema, expected);
    }

    db.cleanup(&[&acme]).await;
}

#[tokio::test]
async fn concurrent_units_of_work_stay_in_their_tenant() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let globex = db.provision("globex").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let executor = db.executor.clone();
        let tenant = if i % 2 == 0 { acme.clone() } else { globex.clone() };
        let expected = executor.schema_for(&tenant.id).unwrap().as_str().to_string();

        handles.push(tokio::spawn(async move {
            let sku = format!("{}-{:02}", tenant.slug, i);
            executor
                .with_tenant_scope(Some(&tenant.id), move |tx| {
                    Box::pin(async move {
                        sqlx::query("INSERT INTO products (id, sku, name, price_cents) VALUES ($1, $2, $2, 1)")
                            .bind(Uuid::new_v4())
                            .bind(&sku)
                            .execute(tx.conn())
                            .await?;
                        let schema: String = sqlx::query_scalar("SELECT current_schema()::text")
                            .fetch_one(tx.conn())
                            .await?;
                        Ok::<_, TenancyError>(schema)
                    })
                })
                .await
                .map(|schema| assert_eq!(schema, expected))
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let acme_skus = product_skus(&db.executor, &acme.id).await;
    let globex_skus = product_skus(&db.executor, &globex.id).await;
    assert_eq!(acme_skus.len(), 10);
    assert_eq!(globex_skus.len(), 10);
    assert!(acme_skus.iter().all(|s| s.starts_with(&acme.slug)));
    assert!(globex_skus.iter().all(|s| s.starts_with(&globex.slug)));

    db.cleanup(&[&acme, &globex]).await;
}

#[tokio::test]
async fn failed_unit_of_work_rolls_back_its_writes() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();

    let result: anyhow::Result<()> = db
        .executor
        .with_tenant_scope(Some(&acme.id), |tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO products (id, sku, name, price_cents) VALUES ($1, 'LOST', 'lost', 1)")
                    .bind(Uuid::new_v4())
                    .execute(tx.conn())
                    .await?;
                Err(anyhow!("business rule failed"))
            })
        })
        .await;

    assert_eq!(result.unwrap_err().to_string(), "business rule failed");
    assert!(product_skus(&db.executor, &acme.id).await.is_empty());

    db.cleanup(&[&acme]).await;
}

#[tokio::test]
async fn search_path_does_not_outlive_the_transaction() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();

    // One connection, so the follow-up query reuses the scoped one.
    let pool = PgPoolOptions::new().max_connections(1).connect(&db.url).await.unwrap();
    let baseline: String = sqlx::query_scalar("SHOW search_path").fetch_one(&pool).await.unwrap();
    let executor = PgScopedExecutor::new(pool.clone(), &db.config.tenancy).unwrap();

    insert_product(&executor, &acme.id, "ACME-1").await.unwrap();
    let _ = executor
        .with_tenant_scope(Some(&acme.id), |_tx| Box::pin(async move { Err::<(), _>(anyhow!("abort")) }))
        .await;

    let after: String = sqlx::query_scalar("SHOW search_path").fetch_one(&pool).await.unwrap();
    assert_eq!(after, baseline);
    assert!(!after.contains(&acme.id));

    pool.close().await;
    db.cleanup(&[&acme]).await;
}

#[tokio::test]
async fn nested_scope_is_refused() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let globex = db.provision("globex").await.unwrap();

    let inner_executor = db.executor.clone();
    let inner_tenant = globex.id.clone();
    let inner = db
        .executor
        .with_tenant_scope(Some(&acme.id), move |_tx| {
            Box::pin(async move {
                let nested = inner_executor
                    .with_tenant_scope(Some(&inner_tenant), |_inner| Box::pin(async move { Ok::<_, TenancyError>(()) }))
                    .await;
                let shared = inner_executor
                    .with_shared_scope(|_inner| Box::pin(async move { Ok::<_, TenancyError>(()) }))
                    .await;
                Ok::<_, TenancyError>((nested, shared))
            })
        })
        .await
        .unwrap();

    assert!(matches!(inner.0, Err(TenancyError::NestedScope)));
    assert!(matches!(inner.1, Err(TenancyError::NestedScope)));

    db.cleanup(&[&acme, &globex]).await;
}

#[tokio::test]
async fn slow_unit_of_work_times_out_and_rolls_back() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let executor = db.executor_with(|tenancy| tenancy.transaction_timeout_ms = 300);
    assert_eq!(executor.timeout(), Duration::from_millis(300));

    let result = executor
        .with_tenant_scope(Some(&acme.id), |tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO products (id, sku, name, price_cents) VALUES ($1, 'SLOW', 'slow', 1)")
                    .bind(Uuid::new_v4())
                    .execute(tx.conn())
                    .await?;
                sqlx::query("SELECT pg_sleep(2)").execute(tx.conn()).await?;
                Ok::<_, TenancyError>(())
            })
        })
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, TenancyError::TransactionTimeout), "unexpected error: {err:?}");
    assert!(err.is_retryable());
    assert!(product_skus(&db.executor, &acme.id).await.is_empty());

    db.cleanup(&[&acme]).await;
}

#[tokio::test]
async fn unprovisioned_schema_is_a_schema_context_error() {
    let Some(db) = common::test_db().await else { return };

    let result = db
        .executor
        .with_tenant_scope(Some("neverprovisioned"), |_tx| Box::pin(async move { Ok::<_, TenancyError>(()) }))
        .await;

    assert!(matches!(result, Err(TenancyError::SchemaContext(None))));
}

#[tokio::test]
async fn shared_scope_only_sees_the_shared_schema() {
    let Some(db) = common::test_db().await else { return };
    let shared = db.executor.shared_schema().as_str().to_string();

    let (schemas, shared_only, tenant_id) = db
        .executor
        .with_shared_scope(|tx| {
            Box::pin(async move {
                let schemas: Vec<String> = sqlx::query_scalar("SELECT current_schemas(false)::text[]")
                    .fetch_one(tx.conn())
                    .await?;
                Ok::<_, TenancyError>((schemas, tx.is_shared_only(), tx.tenant_id().map(str::to_string)))
            })
        })
        .await
        .unwrap();

    assert_eq!(schemas, vec![shared]);
    assert!(shared_only);
    assert!(tenant_id.is_none());
}

#[tokio::test]
async fn executor_is_shareable_across_tasks() {
    let Some(db) = common::test_db().await else { return };
    let executor: Arc<PgScopedExecutor> = db.executor.clone();
    let handle = tokio::spawn(async move {
        executor
            .with_shared_scope(|tx| {
                Box::pin(async move {
                    let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(tx.conn()).await?;
                    Ok::<_, TenancyError>(one)
                })
            })
            .await
    });
    assert_eq!(handle.await.unwrap().unwrap(), 1);
}
