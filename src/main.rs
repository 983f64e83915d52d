//! Builder Registry - gateway server binary

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use builder_registry::tasks::gateway_caches;
use builder_registry::{create_router, spawn_cleanup_task, AppState, Config};

/// Main entry point for the gateway server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the upstream clients and their caches
/// 4. Start the background purge task
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "builder_registry=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Builder Registry gateway");

    let config = Config::from_env();
    info!(
        port = config.server_port,
        eas_ttl = config.eas_cache_ttl,
        eas_stale_window = config.eas_stale_window,
        rpc_endpoints = config.rpc_endpoints.len(),
        retry_attempts = config.retry_max_attempts,
        retry_backoff = ?config.retry_policy().backoff(),
        talent_key = config.talent_api_key.is_some(),
        "Configuration loaded"
    );

    let state = AppState::from_config(&config).context("failed to build upstream clients")?;
    if config.talent_api_key.is_none() {
        warn!("TALENT_API_KEY is not set, Talent requests may be rejected");
    }

    let cleanup_handle = spawn_cleanup_task(
        gateway_caches(&state),
        config.cleanup_interval,
        state.shutdown.clone(),
    );

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("server error")?;

    if let Err(e) = cleanup_handle.await {
        warn!(error = %e, "purge task ended abnormally");
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then cancels background
/// work.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    state.shutdown();
    warn!("Background work cancelled");
}
