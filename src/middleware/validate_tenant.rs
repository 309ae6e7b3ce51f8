use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::auth::SessionContext;
use crate::error::ApiError;
use crate::tenancy::resolve_tenant;

/// Resolve the session's tenant and inject a `TenantAccess` extension.
///
/// Runs after [`super::jwt_auth_middleware`] and before any handler, so
/// permission loading and business queries always see a validated tenant.
pub async fn validate_tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = request
        .extensions()
        .get::<SessionContext>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before tenant validation"))?;

    let access = resolve_tenant(&session, state.directory.as_ref()).await?;

    tracing::debug!(user_id = %session.user_id, ?access, "tenant context resolved");
    request.extensions_mut().insert(access);

    Ok(next.run(request).await)
}
