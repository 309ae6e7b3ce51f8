// handlers/elevated/root/tenant/list.rs - GET /api/root/tenant

use axum::extract::{Extension, State};
use tracing::warn;

use crate::app::AppState;
use crate::auth::SessionContext;
use crate::database::models::Tenant;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::TenantAccess;

/// All tenants, including suspended ones. Runs in the shared-only scope.
pub async fn tenant_list(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Extension(access): Extension<TenantAccess>,
) -> ApiResult<Vec<Tenant>> {
    if !access.is_shared_only() {
        warn!(target: "tenancy::security", user_id = %session.user_id, "non-superadmin requested tenant listing");
        return Err(ApiError::forbidden("Superadmin session required"));
    }

    let tenants = state.directory.list_all().await?;
    Ok(ApiResponse::success(tenants))
}
