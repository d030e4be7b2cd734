//! Health and metrics HTTP server.
//!
//! Provides `/healthz` (liveness), `/readyz` (readiness) and `/metrics`
//! (Prometheus text format) on a listener separate from the callbacks.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::client::RouteClientTrait;
use crate::metrics::render_metrics;

/// Shared state for health check endpoints.
pub struct HealthState<C: RouteClientTrait> {
    /// Whether the callback listener is serving.
    started: AtomicBool,
    /// Client for checking APIRule API connectivity.
    client: Arc<C>,
}

impl<C: RouteClientTrait> HealthState<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            started: AtomicBool::new(false),
            client,
        }
    }

    /// Mark the service as started and ready.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
        info!("Health check: service marked as started");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

/// Build the health router.
pub fn health_router<C: RouteClientTrait + 'static>(state: Arc<HealthState<C>>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz::<C>))
        .route("/metrics", get(scrape))
        .with_state(state)
}

/// Run the health HTTP server until it fails.
///
/// Callers bind the callback listener first; readiness flips once this
/// listener is bound too.
pub async fn run_health_server<C: RouteClientTrait + 'static>(
    state: Arc<HealthState<C>>,
    addr: SocketAddr,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Health check server listening");

    state.mark_started();
    axum::serve(listener, health_router(state)).await
}

/// Liveness probe endpoint.
async fn healthz() -> StatusCode {
    debug!("Liveness probe: OK");
    StatusCode::OK
}

/// Ready once both listeners are bound and the APIRule API answers a list call.
async fn readyz<C: RouteClientTrait + 'static>(State(state): State<Arc<HealthState<C>>>) -> StatusCode {
    if !state.is_started() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    let reachable = state
        .client()
        .check_readiness()
        .await
        .inspect_err(|e| warn!(error = %e, "APIRule API unreachable"))
        .unwrap_or(false);

    if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus scrape endpoint.
async fn scrape() -> Response {
    match render_metrics() {
        Some(body) => body.into_response(),
        None => (StatusCode::NOT_FOUND, "metrics not initialized").into_response(),
    }
}
