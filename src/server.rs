//! HTTP Server and Service Wiring
//!
//! Starts the collector service from configuration and exposes its own
//! health and metrics over HTTP.
//!
//! # Architecture
//!
//! - **Inventory**: the `cluster` section seeds a [`StaticCluster`]
//! - **Manager**: declared collectors are installed first, then discoveries,
//!   so the first discovery cycle finds its collectors ready
//! - **Status**: a [`MetricsStatusWriter`] mirrors every status into gauges
//! - **HTTP Server**: Axum router serving the endpoints below
//!
//! # Endpoints
//!
//! - `GET /` - HTML landing page
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /health` - 200 while the service is running, 503 otherwise
//! - `GET /status` - JSON snapshot of every discovery and collector status
//!
//! # Shutdown
//!
//! On Ctrl-C the server stops accepting requests, discoveries are stopped and
//! every collector pool drains its channel before the process exits.

use crate::cluster::inventory::StaticCluster;
use crate::config::Config;
use crate::manager::Manager;
use crate::metrics::MetricsCollector;
use crate::status::MetricsStatusWriter;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
struct AppState {
    metrics: MetricsCollector,
    status: Arc<MetricsStatusWriter>,
}

pub async fn start(config: Config) -> anyhow::Result<()> {
    let metrics = MetricsCollector::new()?;
    let status = Arc::new(MetricsStatusWriter::new(metrics.clone()));
    let cluster = Arc::new(StaticCluster::from_inventory(config.cluster.clone()));

    let manager = Manager::new(cluster.clone())
        .with_status_writer(status.clone())
        .with_scrape_timeout(config.scrape.timeout())
        .with_status_interval(config.status.interval());

    install_resources(&manager, &cluster, &config).await;
    metrics.up.set(1.0);

    let app = router(metrics.clone(), status);

    let addr = format!("{}:{}", config.server.addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Collector server listening on {}", addr);
    info!("Metrics available at http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    metrics.up.set(0.0);
    info!("Shutting down discoveries and collectors");
    manager.shutdown().await;

    Ok(())
}

/// Installs every declared resource. A resource that fails to install is
/// logged and left out; the rest still start.
async fn install_resources(manager: &Manager, cluster: &StaticCluster, config: &Config) {
    for declared in &config.collectors {
        let key = declared.key();
        match manager
            .add_collection_pool(key.clone(), declared.spec.clone())
            .await
        {
            Ok(()) => cluster.upsert_collector(key, declared.spec.clone()).await,
            Err(e) => error!("Failed to start collector {}: {}", key, e),
        }
    }

    for declared in &config.discoveries {
        let key = declared.key();
        if let Err(e) = manager
            .add_discovery_service(key.clone(), declared.spec.clone())
            .await
        {
            error!("Failed to start discovery {}: {}", key, e);
        }
    }

    info!(
        "Installed {} collector(s) and {} discovery(ies)",
        config.collectors.len(),
        config.discoveries.len()
    );
}

/// Router for the self-observability endpoints.
pub fn router(metrics: MetricsCollector, status: Arc<MetricsStatusWriter>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(AppState { metrics, status })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn root_handler() -> impl IntoResponse {
    axum::response::Html(
        r#"<html>
<head><title>Strata Collector</title></head>
<body>
<h1>Strata Metrics Collector</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/health">Health</a></p>
<p><a href="/status">Status</a></p>
</body>
</html>"#,
    )
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(metrics) => metrics.into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.metrics.up.get() > 0.0 {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Collector service not running")
    }
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.status.snapshot())
}
