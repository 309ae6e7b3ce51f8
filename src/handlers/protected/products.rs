// handlers/protected/products.rs - GET/POST /api/products
//
// Tenant-local catalog. Each request opens exactly one scoped transaction;
// the permission check and the query it guards share it.

use axum::extract::{Extension, Json, State};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::SessionContext;
use crate::database::models::Product;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::load_permissions;
use crate::tenancy::{ScopedTransaction, TenantAccess, TenantScope};

const PRODUCT_COLUMNS: &str = "id, sku, name, price_cents, created_at";

#[derive(Debug, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
}

impl NewProduct {
    fn validate(&self) -> Result<(), ApiError> {
        if self.sku.trim().is_empty() {
            return Err(ApiError::bad_request("sku is required"));
        }
        if self.name.trim().is_empty() {
            return Err(ApiError::bad_request("name is required"));
        }
        if self.price_cents < 0 {
            return Err(ApiError::bad_request("price_cents must not be negative"));
        }
        Ok(())
    }
}

pub async fn product_list(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Extension(access): Extension<TenantAccess>,
) -> ApiResult<Vec<Product>> {
    let tenant_id = require_tenant(&access)?;
    let user_id = session.user_id;

    let products = state
        .executor
        .with_tenant_scope(Some(tenant_id), move |tx| {
            Box::pin(async move {
                require_permission(tx, user_id, "products:read").await?;
                let sql = format!("SELECT {} FROM products ORDER BY sku", PRODUCT_COLUMNS);
                let rows = sqlx::query_as::<_, Product>(&sql).fetch_all(tx.conn()).await?;
                Ok::<_, ApiError>(rows)
            })
        })
        .await?;

    Ok(ApiResponse::success(products))
}

pub async fn product_create(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Extension(access): Extension<TenantAccess>,
    Json(body): Json<NewProduct>,
) -> ApiResult<Product> {
    body.validate()?;
    let tenant_id = require_tenant(&access)?;
    let user_id = session.user_id;

    let product = state
        .executor
        .with_tenant_scope(Some(tenant_id), move |tx| {
            Box::pin(async move {
                require_permission(tx, user_id, "products:write").await?;
                let sql = format!(
                    "INSERT INTO products (id, sku, name, price_cents) VALUES ($1, $2, $3, $4) RETURNING {}",
                    PRODUCT_COLUMNS
                );
                let row = sqlx::query_as::<_, Product>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(body.sku.trim())
                    .bind(body.name.trim())
                    .bind(body.price_cents)
                    .fetch_one(tx.conn())
                    .await?;
                Ok::<_, ApiError>(row)
            })
        })
        .await?;

    info!(tenant_id = %tenant_id, sku = %product.sku, "product created");
    Ok(ApiResponse::created(product))
}

/// Superadmin sessions carry no tenant and cannot touch tenant data.
fn require_tenant(access: &TenantAccess) -> Result<&str, ApiError> {
    access
        .tenant_id()
        .ok_or_else(|| ApiError::forbidden("Tenant session required"))
}

async fn require_permission(
    tx: &mut ScopedTransaction,
    user_id: Uuid,
    permission: &str,
) -> Result<(), ApiError> {
    let permissions = load_permissions(tx, user_id).await?;
    if permissions.allows(permission) {
        return Ok(());
    }
    warn!(
        target: "tenancy::security",
        user_id = %user_id,
        tenant_id = ?tx.tenant_id(),
        permission,
        "permission denied"
    );
    Err(ApiError::forbidden("Insufficient permissions"))
}
