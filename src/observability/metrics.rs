//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (sessions, failures, cache, relayed bytes)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend active sessions
//!
//! # Metrics
//! - `proxy_sessions_total` (counter): sessions created
//! - `proxy_sessions_active` (gauge): live sessions
//! - `proxy_sessions_refused_total` (counter): clients closed at accept, by reason
//! - `proxy_session_failures_total` (counter): abnormal teardowns, by reason
//! - `proxy_session_peer_closes_total` (counter): client or backend hung up, by endpoint
//! - `proxy_backend_active_connections` (gauge): reservations per backend
//! - `proxy_cache_lookups_total` (counter): lookups by result
//! - `proxy_cache_entries` (gauge): stored responses
//! - `proxy_bytes_relayed_total` (counter): bytes by direction
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The exporter serves scrapes from its own thread

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_session_opened(active: usize) {
    metrics::counter!("proxy_sessions_total").increment(1);
    metrics::gauge!("proxy_sessions_active").set(active as f64);
}

pub fn record_session_closed(active: usize) {
    metrics::gauge!("proxy_sessions_active").set(active as f64);
}

pub fn record_session_refused(reason: &'static str) {
    metrics::counter!("proxy_sessions_refused_total", "reason" => reason).increment(1);
}

pub fn record_session_failure(reason: &'static str) {
    metrics::counter!("proxy_session_failures_total", "reason" => reason).increment(1);
}

pub fn record_peer_close(endpoint: &'static str) {
    metrics::counter!("proxy_session_peer_closes_total", "endpoint" => endpoint).increment(1);
}

pub fn record_backend_active(index: usize, active: usize) {
    metrics::gauge!("proxy_backend_active_connections", "backend" => index.to_string())
        .set(active as f64);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(entries: usize) {
    metrics::gauge!("proxy_cache_entries").set(entries as f64);
}

pub fn record_bytes_relayed(direction: &'static str, bytes: usize) {
    metrics::counter!("proxy_bytes_relayed_total", "direction" => direction).increment(bytes as u64);
}
