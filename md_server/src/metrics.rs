//! Prometheus metrics for monitoring server health.
//!
//! Metrics are exposed on a dedicated scrape listener in Prometheus text
//! format. Counters are recorded by the HTTP layer and by the event handlers
//! subscribed to the outbox dispatcher.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter on `addr`; metrics are served at
/// `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

/// Count an HTTP request by method, path, and response status.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Count a domain event published through the outbox dispatcher.
pub fn events_published_total(event_type: &str) {
    metrics::counter!("events_published_total",
        "event_type" => event_type.to_string()
    )
    .increment(1);
}

/// Count tournaments finalized.
pub fn tournaments_finalized_total() {
    metrics::counter!("tournaments_finalized_total").increment(1);
}
