//! Main entry point for the authgate backend.
//!
//! Loads configuration, opens and migrates the database, starts the
//! background workers and serves the Axum router.

mod api;
mod auth;
mod config;
mod database;
mod errors;
mod repositories;
mod services;
mod state;

use anyhow::{Context, Result};
use config::Config;
use database::Database;
use services::email_outbox::{EmailOutbox, spawn_email_worker};
use services::email_service::transport_from_config;
use services::token_sweeper::spawn_token_sweeper;
use state::AppState;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let db = Database::new(&config).await?;
    db.migrate().await?;
    info!("Database ready at {}", config.database_url);

    let transport = transport_from_config(config.email.as_ref())?;
    let (outbox, receiver) = EmailOutbox::channel(config.email_queue_capacity);
    spawn_email_worker(receiver, transport);

    if config.token_sweep_interval_seconds > 0 {
        spawn_token_sweeper(
            db.pool().clone(),
            Duration::from_secs(config.token_sweep_interval_seconds),
        );
        info!(
            "Expired-token sweeper running every {}s",
            config.token_sweep_interval_seconds
        );
    }

    let server_port = config.server_port;
    let state = AppState::new(db.pool().clone(), config, outbox)?;
    let app = api::app_router(state);

    let bind_address = format!("0.0.0.0:{}", server_port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    info!("Starting authgate server on port {}", server_port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
