use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AppConfig, Environment};
use crate::database::DatabaseManager;
use crate::handlers;
use crate::middleware::{jwt_auth_middleware, validate_tenant_middleware};
use crate::services::{PgTenantDirectory, TenantDirectory};
use crate::tenancy::{PgScopedExecutor, TenancyError};

/// Everything a request handler may touch. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub database: DatabaseManager,
    pub executor: Arc<PgScopedExecutor>,
    pub directory: Arc<dyn TenantDirectory>,
}

impl AppState {
    pub fn new(config: AppConfig, database: DatabaseManager) -> Result<Self, TenancyError> {
        let executor = Arc::new(PgScopedExecutor::new(database.pool().clone(), &config.tenancy)?);
        let directory = Arc::new(PgTenantDirectory::new(executor.clone()));

        Ok(Self {
            config: Arc::new(config),
            database,
            executor,
            directory,
        })
    }

    /// Swap the tenant directory, e.g. for an in-memory one in tests.
    pub fn with_directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = directory;
        self
    }
}

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        // Tenant-scoped API
        .merge(protected_routes(state.clone()))
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes))
        .layer(cors_layer(&state.config));

    if state.config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    use axum::routing::post;
    use handlers::public::auth;

    Router::new().route("/auth/login/:tenant/:user", post(auth::session_login))
}

/// Layers run bottom-up: JWT decoding, then tenant resolution, then the handler.
fn protected_routes(state: AppState) -> Router<AppState> {
    use handlers::elevated::root::tenant;
    use handlers::protected::{auth, products};

    Router::new()
        .route("/api/auth/whoami", get(auth::session_whoami))
        .route("/api/products", get(products::product_list).post(products::product_create))
        .route("/api/root/tenant", get(tenant::tenant_list))
        .route_layer(from_fn_with_state(state.clone(), validate_tenant_middleware))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.environment == Environment::Development {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "login": "/auth/login/:tenant/:user (public)",
                "auth": "/api/auth/whoami (protected)",
                "products": "/api/products (protected)",
                "root": "/api/root/tenant (superadmin)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.database.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
