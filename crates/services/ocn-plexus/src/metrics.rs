use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::task;

/// Metrics prefix for OCN plexus metrics
pub const METRICS_PREFIX: &str = "ocn_plexus";

/// Labels used for metrics dimensions
pub mod labels {
    pub const OPERATION: &str = "operation";
    pub const STATUS: &str = "status";
}

/// Operation types for metrics labeling
pub mod operations {
    pub const SEND: &str = "send";
    pub const CLAIM: &str = "claim";
    pub const RESOLVE: &str = "resolve";
    pub const ISSUE: &str = "issue";
    pub const VERIFY_CONTACT: &str = "verify_contact";
    pub const ACCEPT: &str = "accept";
}

/// Status values for metrics labeling
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
}

/// Count one operation outcome.
pub fn record_operation(operation: &'static str, status: &'static str) {
    metrics::counter!(
        concat!("ocn_plexus", "_operations_total"),
        labels::OPERATION => operation,
        labels::STATUS => status,
    )
    .increment(1);
}

/// Sets up the Prometheus metrics registry with sensible defaults
pub fn setup_metrics_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("ocn_plexus_send_latency_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .expect("bucket list is non-empty");

    builder
        .install_recorder()
        .expect("metrics recorder already installed")
}

/// Spawn a separate web server that serves Prometheus metrics
pub fn spawn_metrics_exporter(handle: PrometheusHandle, addr: SocketAddr) -> task::JoinHandle<()> {
    task::spawn(async move {
        let app = axum::Router::new().route(
            "/metrics",
            axum::routing::get(move || std::future::ready(handle.render())),
        );

        tracing::info!("Starting metrics exporter on {}", addr);
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!("metrics exporter failed: {}", e);
                }
            }
            Err(e) => tracing::error!("could not bind metrics exporter on {}: {}", addr, e),
        }
    })
}
