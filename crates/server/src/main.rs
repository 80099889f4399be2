mod bootstrap;
mod context;
mod delivery;
mod health;
mod knowledge;
mod pipeline;
mod poller;
mod review;
mod schedule;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use barkline_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use barkline_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    let api = Router::new().nest(
        "/api/v1",
        Router::new()
            .merge(review::router(app.pipeline.clone()))
            .merge(schedule::router(app.pipeline.clone())),
    );

    let address =
        format!("{}:{}", app.config.server.bind_address, app.config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "barkline-server api listening"
    );

    let poller = poller::spawn(
        app.pipeline.clone(),
        Duration::from_secs(app.config.pipeline.poll_interval_secs),
    );

    let shutdown_grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    axum::serve(listener, api).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "barkline-server stopping");
    let _ = tokio::time::timeout(shutdown_grace, poller.stop()).await;

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
