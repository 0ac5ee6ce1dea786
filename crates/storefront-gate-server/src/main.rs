//! storefront-gate-server: admin gate, auth callback and sign-out for the
//! storefront.
//!
//! Reads config from env vars (a `.env` file is honoured):
//!   STOREFRONT_BACKEND_URL       — hosted backend base URL (required)
//!   STOREFRONT_BACKEND_ANON_KEY  — public API key (required)
//!   STOREFRONT_BIND_ADDR         — listen address (default: 0.0.0.0:3000)
//!   STOREFRONT_DATABASE_URL      — direct profile lookups (feature `database`)

use std::sync::Arc;

use anyhow::Context;
use storefront_gate::RoleDirectory;
use storefront_gate_server::{build_router, AppState, HostedBackend, ServerConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,storefront_gate=debug,storefront_gate_server=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env().context("loading configuration")?;
    tracing::info!(
        admin_prefix = %config.gate.admin_prefix,
        admitted = ?config.gate.policy.admitted().collect::<Vec<_>>(),
        "gate configured"
    );

    let backend = Arc::new(HostedBackend::from_config(&config).context("building HTTP client")?);
    let roles = role_directory(&config, Arc::clone(&backend)).await?;

    let state = AppState::from_config(&config, backend, roles);
    let app = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    tracing::info!("storefront-gate-server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

#[cfg(feature = "database")]
async fn role_directory(
    config: &ServerConfig,
    backend: Arc<HostedBackend>,
) -> anyhow::Result<Arc<dyn RoleDirectory>> {
    let Some(database_url) = &config.database_url else {
        return Ok(backend);
    };
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to database")?;
    tracing::info!("role lookups go straight to Postgres");
    Ok(Arc::new(storefront_gate_server::pg::PgRoleDirectory::new(pool)))
}

#[cfg(not(feature = "database"))]
async fn role_directory(
    config: &ServerConfig,
    backend: Arc<HostedBackend>,
) -> anyhow::Result<Arc<dyn RoleDirectory>> {
    if config.database_url.is_some() {
        tracing::warn!("STOREFRONT_DATABASE_URL set but built without the `database` feature");
    }
    Ok(backend)
}
