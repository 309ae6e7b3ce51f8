// handlers/public/auth/login.rs - POST /auth/login/:tenant/:user

use axum::extract::{Json, Path, State};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{generate_jwt, verify_against_decoy, verify_password, Claims};
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenancy::TenantScope;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub tenant: String,
    pub user: LoginUser,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}

/// Exchange tenant slug, user login and password for a session token.
///
/// The token carries the tenant's internal id, never the slug. Unknown
/// tenant, suspended tenant, unknown user and wrong password all produce the
/// same 401 so the response does not reveal which one failed.
pub async fn session_login(
    State(state): State<AppState>,
    Path((tenant_slug, login)): Path<(String, String)>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let Some(tenant) = state.directory.find_by_slug(&tenant_slug).await? else {
        warn!(target: "tenancy::security", tenant = ?tenant_slug, "login for unknown or inactive tenant");
        verify_against_decoy(&body.password);
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    let user: Option<User> = state
        .executor
        .with_tenant_scope(Some(&tenant.id), move |tx| {
            Box::pin(async move {
                let row = sqlx::query_as::<_, User>(
                    "SELECT id, name, auth, role, password_hash, is_active FROM users WHERE auth = $1",
                )
                .bind(&login)
                .fetch_optional(tx.conn())
                .await?;
                Ok::<_, ApiError>(row)
            })
        })
        .await?;

    let user = match user {
        Some(user) if user.is_active && verify_password(&body.password, &user.password_hash) => user,
        found => {
            if !found.as_ref().is_some_and(|user| user.is_active) {
                verify_against_decoy(&body.password);
            }
            warn!(target: "tenancy::security", tenant = %tenant.slug, "login rejected");
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
    };

    let expiry_hours = state.config.security.jwt_expiry_hours;
    let claims = Claims::new(user.id, Some(tenant.id.clone()), false, expiry_hours);
    let token = generate_jwt(&claims, &state.config.security.jwt_secret)?;

    info!(tenant = %tenant.slug, user_id = %user.id, "session issued");

    Ok(ApiResponse::success(LoginResponse {
        token,
        expires_in: expiry_hours.saturating_mul(3600),
        tenant: tenant.slug,
        user: LoginUser {
            id: user.id,
            name: user.name,
            role: user.role,
        },
    }))
}
