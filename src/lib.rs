//! Indicator dashboard service with once-per-period reaction and poll votes.
//!
//! Vote totals are kept either in a shared Postgres document table or, when no
//! database is configured, in process memory. Each visitor's eligibility
//! records live in a durable key-value store namespaced by visitor id.
use std::net::SocketAddr;
use std::time::Duration;

use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod backend;
pub mod clock;
pub mod config;
pub mod db;
pub mod eligibility;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod models;
pub mod presentation;
pub mod routes;
pub mod services;
pub mod storage;
pub mod vote;

use config::Config;
use services::AppState;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}

pub async fn run(config: Config) -> std::io::Result<()> {
    info!("Initializing state...");
    let state = AppState::build(&config).await;
    let app = routes::create_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let handle = axum_server::Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    info!("Server running on {addr}");
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal(handle: axum_server::Handle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
