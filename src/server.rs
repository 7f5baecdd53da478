//! HTTP status listener.
//!
//! * `GET /health` - always `200 ok` while the process serves requests.
//! * `GET /status` - the current [`MonitorState`]; `503` once the monitor has stopped.

use std::{future::Future, net::SocketAddr};

use axum::{Router, extract::State, http::StatusCode, routing::get};
use tokio::{net::TcpListener, sync::watch};
use tracing::info;

use crate::types::MonitorState;

/// Builds the status router on top of a monitor state receiver.
pub fn router(state: watch::Receiver<MonitorState>) -> Router {
    Router::new().route("/health", get(health)).route("/status", get(status)).with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<watch::Receiver<MonitorState>>) -> (StatusCode, String) {
    let current = *state.borrow();
    let code = if current.is_stopped() { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };
    (code, current.to_string())
}

/// Binds the status listener.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Status listener bound");
    Ok(listener)
}

/// Serves the status router on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    state: watch::Receiver<MonitorState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}
