//! qamedic -- Appliance-grade QA test orchestration.
//!
//! This crate provides the core library for dispatching test runs (unit,
//! e2e, sample, custom plugins), recording every outcome in a durable
//! result store, and producing report artifacts.

pub mod api;
pub mod backends;
pub mod config;
pub mod dispatch;
pub mod plugin;
pub mod report;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;

/// Start the qamedic daemon: result store, dispatcher, and API server.
pub async fn serve(bind: &str, config: config::Config) -> Result<()> {
    // 1. Initialize Storage
    let db_path = config.effective_database_path();
    tracing::info!(db_path = %db_path.display(), "Initializing database");
    let pool = storage::open_pool(&db_path)?;

    // 2. Initialize Dispatcher (plugins resolve once, here)
    let dispatcher = Arc::new(dispatch::Dispatcher::new(pool.clone(), config));
    for (name, reason) in dispatcher.plugin_failures() {
        tracing::warn!(%name, %reason, "plugin entry did not resolve");
    }

    // 3. Start API Server
    let addr: std::net::SocketAddr = bind.parse()?;
    let state = api::state::AppState::new(pool, dispatcher);
    let app = api::router(state);

    tracing::info!(%addr, "qamedic listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
