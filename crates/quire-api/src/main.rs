//! # quire-api: Binary Entry Point
//!
//! Reads configuration from the environment, opens the database, and serves
//! the Quire API until Ctrl-C.

use std::net::SocketAddr;

use quire_api::config::{AppConfig, LogFormat};
use quire_api::state::AppState;

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    if config.jwt_secret_ephemeral {
        tracing::warn!(
            "QUIRE_JWT_SECRET is not set; using an ephemeral secret. Tokens will not survive a restart."
        );
    }
    if !config.rate_limit.enabled {
        tracing::info!("rate limiting disabled");
    }

    let pool = quire_api::db::init_pool(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    let port = config.port;
    let app = quire_api::app(AppState::new(pool, config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Quire API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
