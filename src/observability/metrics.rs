//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_requests_total` (counter): bridged requests by operation, outcome
//! - `bridge_request_duration_seconds` (histogram): handshake latency
//! - `bridge_payload_bytes_total` (counter): file bytes moved through the bridge
//! - `bridge_backend_connections` (gauge): live backend sockets
//!
//! Recording is a no-op until `init_metrics` installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// Record one finished bridge request.
pub fn record_request(operation: &'static str, outcome: &'static str, start: Instant) {
    metrics::counter!("bridge_requests_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("bridge_request_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_payload_bytes(operation: &'static str, bytes: u64) {
    metrics::counter!("bridge_payload_bytes_total", "operation" => operation).increment(bytes);
}

pub fn record_backend_connection_opened() {
    metrics::gauge!("bridge_backend_connections").increment(1.0);
}

pub fn record_backend_connection_closed() {
    metrics::gauge!("bridge_backend_connections").decrement(1.0);
}
