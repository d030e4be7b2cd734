//! Prometheus metrics
//!
//! Counters are recorded through the `metrics` facade; without an installed
//! recorder they are no-ops.

use std::sync::OnceLock;

use ::metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names
pub mod names {
    pub const ENSURE_TOTAL: &str = "tenant_routes_ensure_total";
    pub const REMOVE_TOTAL: &str = "tenant_routes_remove_total";
    pub const PROBE_ERRORS_TOTAL: &str = "tenant_routes_probe_errors_total";
    pub const ORPHANED_ROUTES_TOTAL: &str = "tenant_routes_orphaned_routes_total";
}

/// Install the Prometheus recorder.
///
/// Returns `false` if already installed or if installation failed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format, `None` if not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Record the outcome of an ensure call
pub fn record_ensure(outcome: &'static str) {
    counter!(names::ENSURE_TOTAL, "outcome" => outcome).increment(1);
}

/// Record the outcome of a remove call
pub fn record_remove(outcome: &'static str) {
    counter!(names::REMOVE_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a lookup that failed for a reason other than 404
pub fn record_probe_error() {
    counter!(names::PROBE_ERRORS_TOTAL).increment(1);
}

/// Record an APIRule that may have been left behind by a failed delete
pub fn record_orphaned_route() {
    counter!(names::ORPHANED_ROUTES_TOTAL).increment(1);
}
