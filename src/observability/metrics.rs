//! Metrics collection and exposition.
//!
//! # Metrics
//! - `pki_probe_total` (counter): readiness probes by operation and outcome
//! - `pki_transition_total` (counter): lifecycle operations by result
//! - `pki_transition_duration_seconds` (histogram): time spent waiting
//! - `pki_credential_resolutions_total` (counter): resolutions by source

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint. Needs a running Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_probe(operation: &str, outcome: &str) {
    metrics::counter!(
        "pki_probe_total",
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_transition(operation: &str, result: &str, elapsed: Duration) {
    metrics::counter!(
        "pki_transition_total",
        "operation" => operation.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "pki_transition_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_credential_resolution(source: &'static str) {
    metrics::counter!("pki_credential_resolutions_total", "source" => source).increment(1);
}
