//! Metrics collection and exposition.
//!
//! # Metrics
//! - `chat_connections_total` (counter): accepted WebSocket sessions
//! - `chat_active_connections` (gauge): live sessions
//! - `chat_auth_total` (counter): handshake outcomes by `outcome`
//! - `chat_calls_total` (counter): routed calls by `outcome`
//! - `chat_backend_request_duration_seconds` (histogram): backend latency by `kind`
//! - `chat_close_total` (counter): server-initiated closes by `code`

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened() {
    ::metrics::counter!("chat_connections_total").increment(1);
    ::metrics::gauge!("chat_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    ::metrics::gauge!("chat_active_connections").decrement(1.0);
}

pub fn record_auth(outcome: &'static str) {
    ::metrics::counter!("chat_auth_total", "outcome" => outcome).increment(1);
}

pub fn record_call(outcome: &'static str) {
    ::metrics::counter!("chat_calls_total", "outcome" => outcome).increment(1);
}

pub fn record_backend_request(kind: &'static str, start: Instant) {
    ::metrics::histogram!("chat_backend_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_close(code: u16) {
    ::metrics::counter!("chat_close_total", "code" => code.to_string()).increment(1);
}
