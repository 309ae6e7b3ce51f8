// handlers/protected/auth/whoami.rs - GET /api/auth/whoami

use axum::extract::{Extension, State};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::SessionContext;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::{load_permissions, UserPermissions};
use crate::tenancy::{TenantAccess, TenantScope};

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub user_id: Uuid,
    pub is_super_admin: bool,
    pub access: TenantAccess,
    /// Absent for superadmin sessions, which have no tenant-local role.
    pub permissions: Option<UserPermissions>,
}

pub async fn session_whoami(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Extension(access): Extension<TenantAccess>,
) -> ApiResult<WhoamiResponse> {
    let permissions = match access.tenant_id() {
        None => None,
        Some(tenant_id) => {
            let user_id = session.user_id;
            let loaded = state
                .executor
                .with_tenant_scope(Some(tenant_id), move |tx| {
                    Box::pin(async move { Ok::<_, ApiError>(load_permissions(tx, user_id).await?) })
                })
                .await?;
            Some(loaded)
        }
    };

    Ok(ApiResponse::success(WhoamiResponse {
        user_id: session.user_id,
        is_super_admin: session.is_super_admin,
        access,
        permissions,
    }))
}
