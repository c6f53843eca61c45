mod api;
mod bus;
mod config;
mod control;
mod db;
mod reconciler;

use std::time::Duration;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{
    api::AppState,
    bus::BusClient,
    config::Config,
    reconciler::{PgStatusStore, Reconciler},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent — env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    // Connect to DB and run migrations
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    // Build the bus client; the reconciler task owns and drives the event
    // loop, which also keeps the publish side's connection alive.
    let (bus, event_loop) = BusClient::connect(&config);

    // Spawn the reconciler on the broker's delivery path
    {
        let store = PgStatusStore::new(pool.clone());
        let timeout = Duration::from_secs(config.store_timeout_secs);
        let reconciler = Reconciler::new(bus.clone(), store, timeout);
        tokio::spawn(reconciler.run(event_loop));
    }

    // Start HTTP server
    let state = AppState::new(pool, bus.clone());
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bus.disconnect().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
