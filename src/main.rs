use anyhow::Context;
use tracing_subscriber::EnvFilter;

use storefront_tenancy::app::{app, AppState};
use storefront_tenancy::config::config;
use storefront_tenancy::database::DatabaseManager;
use storefront_tenancy::is_development;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config();
    config.validate().context("invalid configuration")?;
    tracing::info!("Starting storefront-tenancy in {:?} mode", config.environment);
    if is_development!() {
        tracing::warn!("development mode: permissive CORS and built-in JWT secret");
    }

    let database_url = DatabaseManager::database_url_from_env()?;
    let database = DatabaseManager::connect(&database_url, &config.database).await?;
    let state = AppState::new(config.clone(), database.clone())?;

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    database.close().await;
    tracing::info!("connection pool closed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
