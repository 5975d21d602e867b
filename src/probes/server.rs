//! Axum HTTP servers for probes and metrics

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{self, Readiness};
use crate::{Error, Result};

/// `/healthz` plus the readiness probe at `readiness_path`
pub fn probe_router(readiness_path: &str, readiness: Readiness) -> Router {
    let mut router = Router::new().route(readiness_path, get(handlers::ready));
    if readiness_path != "/healthz" {
        router = router.route("/healthz", get(handlers::health));
    }
    router
        .layer(TraceLayer::new_for_http())
        .with_state(readiness)
}

#[cfg(feature = "metrics")]
pub fn metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
}

/// Bind on all interfaces
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })
}

/// Serve `router` until `shutdown` is cancelled
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<()> {
    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
