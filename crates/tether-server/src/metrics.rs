//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports to Prometheus
//! format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "tether_connections_total";
    pub const MESSAGES_TOTAL: &str = "tether_messages_total";
    pub const MODELS_HOSTED: &str = "tether_models_hosted";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of peer connections greeted since server start"
    );
    metrics::describe_counter!(
        names::MESSAGES_TOTAL,
        "Total number of model events processed"
    );
    metrics::describe_gauge!(names::MODELS_HOSTED, "Number of models hosted by this hub");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a greeted peer connection.
pub fn record_connection(model: &str) {
    counter!(names::CONNECTIONS_TOTAL, "model" => model.to_string()).increment(1);
}

/// Record a processed model event.
pub fn record_event(model: &str, event: &'static str) {
    counter!(names::MESSAGES_TOTAL, "model" => model.to_string(), "event" => event).increment(1);
}

/// Update the hosted-model count.
pub fn set_hosted_models(count: usize) {
    gauge!(names::MODELS_HOSTED).set(count as f64);
}
