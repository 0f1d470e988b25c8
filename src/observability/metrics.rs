//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): handler + encode latency
//! - `http_active_sessions` (gauge): open HTTP sessions
//! - `ws_active_connections` (gauge): open WebSocket connections
//! - `ws_messages_total` (counter): messages by direction
//! - `write_queue_full_total` (counter): rejected enqueues by kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter is opt-in via config

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("http_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn session_opened() {
    metrics::gauge!("http_active_sessions").increment(1.0);
}

pub fn session_closed() {
    metrics::gauge!("http_active_sessions").decrement(1.0);
}

pub fn websocket_opened() {
    metrics::gauge!("ws_active_connections").increment(1.0);
}

pub fn websocket_closed() {
    metrics::gauge!("ws_active_connections").decrement(1.0);
}

pub fn record_ws_message(direction: &'static str) {
    metrics::counter!("ws_messages_total", "direction" => direction).increment(1);
}

pub fn record_queue_full(kind: &'static str) {
    metrics::counter!("write_queue_full_total", "kind" => kind).increment(1);
}
