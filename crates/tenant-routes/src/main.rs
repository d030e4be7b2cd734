use std::sync::Arc;

use anyhow::{bail, Context, Result};
use kube::Client;
use tokio::net::TcpListener;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tenant_routes::apirule::RouteTemplate;
use tenant_routes::client::KubeRouteClient;
use tenant_routes::handlers::{router, AppState};
use tenant_routes::health::{run_health_server, HealthState};
use tenant_routes::metrics::init_metrics;
use tenant_routes::{RouteSynchronizer, TenantRoutesConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs for production
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("tenant-routes starting");

    let config = Arc::new(TenantRoutesConfig::from_env().context("Failed to load configuration")?);

    info!(
        cluster_domain = %config.cluster_domain,
        namespace = %config.namespace,
        host_suffix = %config.host_suffix,
        service = %format!("{}:{}", config.service_name, config.service_port),
        gateway = %config.gateway,
        api_timeout_secs = config.api_timeout.as_secs(),
        dependencies = config.dependencies.len(),
        "Loaded configuration"
    );

    init_metrics();

    let kube_client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Connected to Kubernetes cluster");

    let route_client = Arc::new(KubeRouteClient::new(
        kube_client,
        &config.namespace,
        config.api_timeout,
    ));

    let synchronizer = RouteSynchronizer::new(route_client.clone(), RouteTemplate::from_config(&config));
    let app = router(Arc::new(AppState::new(config.clone(), synchronizer)));
    let health = Arc::new(HealthState::new(route_client));

    let listener = TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;

    info!(addr = %config.bind_address, "Callback server listening");

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    select! {
        result = async { axum::serve(listener, app).await } => {
            error!("Callback server exited");
            result.context("Callback server failed")?;
            bail!("Callback server exited unexpectedly");
        }
        result = run_health_server(health.clone(), config.health_bind_address) => {
            error!("Health server exited");
            result.context("Health server failed")?;
            bail!("Health server exited unexpectedly");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
