use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::services;
use super::state::AppState;
use crate::config::Config;
use crate::fetcher::ytdlp::YtDlpFetcher;
use crate::store::TaskStore;

/// Build the application router over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(services::submit_task))
        .route("/formats", get(services::list_formats))
        .route("/tasks/{task_id}/progress", get(services::get_progress))
        .route("/tasks/{task_id}/download", get(services::download_artifact))
        .route("/health", get(services::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Load configuration, open the task store, and serve until shutdown.
///
/// An explicit `address` overrides the configured bind address.
pub async fn run(
    address: Option<SocketAddr>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::load()?;

    let store = TaskStore::open(&config.storage.work_dir).await?;
    info!(work_dir = %config.storage.work_dir.display(), "Task store ready");

    let fetcher = Arc::new(YtDlpFetcher::new(config.fetcher.clone()));
    let bind_addr = address.unwrap_or(config.server.bind_addr);

    let state = AppState::new(config, store, fetcher);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}
