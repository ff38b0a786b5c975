//! HTTP server: load the model, then serve until SIGINT/SIGTERM.

pub mod protocol;
pub mod routes;

use crate::config::Config;
use crate::error::{MedqaError, Result};
use crate::model::backend::InferenceBackend;
use crate::service::InferenceService;
use crate::service::availability::ModelState;
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub use routes::router;

/// Load the model with `loader`, then serve on the configured address.
///
/// A failed load does not stop the server: `/status` reports not-ready and
/// `/get_answer` answers 503 until the process is restarted.
pub async fn run_server<F>(config: Config, loader: F) -> Result<()>
where
    F: FnOnce() -> Result<Box<dyn InferenceBackend>> + Send + 'static,
{
    let timeout = config.server.generation_timeout()?;
    let service = Arc::new(InferenceService::new(&config));

    let loading = Arc::clone(&service);
    let state = tokio::task::spawn_blocking(move || loading.load_with(loader))
        .await
        .map_err(|e| MedqaError::model_load("Load task", e))??;
    if state == ModelState::Failed {
        tracing::warn!(
            "Serving without a model; /get_answer fails until the server is restarted"
        );
    }

    let listener = bind(&config.server.bind_address()).await?;
    serve(listener, service, timeout, shutdown_signal()).await
}

/// Bind a TCP listener, mapping failures to `Server` errors.
pub async fn bind(address: &str) -> Result<TcpListener> {
    TcpListener::bind(address)
        .await
        .map_err(|e| MedqaError::Server {
            message: format!("Failed to bind {address}: {e}"),
        })
}

/// Serve `service` on `listener` until `shutdown` resolves.
pub async fn serve<S>(
    listener: TcpListener,
    service: Arc<InferenceService>,
    generation_timeout: Option<std::time::Duration>,
    shutdown: S,
) -> Result<()>
where
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let local: Option<SocketAddr> = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!(%addr, "Listening");
    }

    let app = router(AppState::new(service, generation_timeout));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| MedqaError::Server {
            message: format!("Server error: {e}"),
        })?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        if let Err(e) = wait_for_sigterm().await {
            tracing::error!(error = %e, "Failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => tracing::info!("Received SIGINT, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
