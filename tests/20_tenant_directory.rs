mod common;

use storefront_tenancy::services::{PgTenantDirectory, TenantDirectory};
use storefront_tenancy::tenancy::{resolve_tenant, TenancyError, TenantAccess, TenantScope};
use storefront_tenancy::auth::SessionContext;
use uuid::Uuid;

#[tokio::test]
async fn active_tenant_is_found_by_slug_and_id() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let directory = PgTenantDirectory::new(db.executor.clone());

    let by_slug = directory.find_by_slug(&acme.slug).await.unwrap().unwrap();
    let by_id = directory.find_by_id(&acme.id).await.unwrap().unwrap();
    assert_eq!(by_slug.id, acme.id);
    assert_eq!(by_id.slug, acme.slug);
    assert!(by_id.is_active);

    assert!(directory.find_by_slug("no-such-tenant").await.unwrap().is_none());

    db.cleanup(&[&acme]).await;
}

#[tokio::test]
async fn suspended_tenant_looks_missing_but_is_listed() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let directory = PgTenantDirectory::new(db.executor.clone());

    db.set_active(&acme, false).await.unwrap();

    assert!(directory.find_by_slug(&acme.slug).await.unwrap().is_none());
    assert!(directory.find_by_id(&acme.id).await.unwrap().is_none());

    let listed = directory.list_all().await.unwrap();
    let entry = listed.iter().find(|t| t.id == acme.id).expect("suspended tenant listed");
    assert!(!entry.is_active);

    db.set_active(&acme, true).await.unwrap();
    assert!(directory.find_by_id(&acme.id).await.unwrap().is_some());

    db.cleanup(&[&acme]).await;
}

#[tokio::test]
async fn sessions_resolve_against_the_live_directory() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let directory = PgTenantDirectory::new(db.executor.clone());

    let session = SessionContext {
        user_id: Uuid::new_v4(),
        tenant_id: Some(acme.id.clone()),
        is_super_admin: false,
    };
    match resolve_tenant(&session, &directory).await.unwrap() {
        TenantAccess::Tenant(resolved) => {
            assert_eq!(resolved.tenant_id, acme.id);
            assert_eq!(resolved.slug, acme.slug);
        }
        other => panic!("expected tenant access, got {other:?}"),
    }

    db.set_active(&acme, false).await.unwrap();
    assert!(matches!(
        resolve_tenant(&session, &directory).await,
        Err(TenancyError::TenantUnavailable)
    ));

    db.cleanup(&[&acme]).await;
}

#[tokio::test]
async fn directory_lookup_inside_a_unit_of_work_is_nested() {
    let Some(db) = common::test_db().await else { return };
    let acme = db.provision("acme").await.unwrap();
    let directory = PgTenantDirectory::new(db.executor.clone());
    let slug = acme.slug.clone();

    let nested = db
        .executor
        .with_tenant_scope(Some(&acme.id), move |_tx| {
            Box::pin(async move { Ok::<_, TenancyError>(directory.find_by_slug(&slug).await) })
        })
        .await
        .unwrap();

    assert!(matches!(nested, Err(TenancyError::NestedScope)));

    db.cleanup(&[&acme]).await;
}
