//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_http_requests_total` (counter): bridged exchanges by upstream status
//! - `bridge_http_upstream_errors_total` (counter): bridged exchanges that failed upstream
//! - `bridge_ws_connections_active` (gauge): open upstream websocket connections
//! - `bridge_ws_connect_failures_total` (counter): refused upstream websocket connects
//! - `bridge_passthrough_total` (counter): scopes handed to the primary application, by kind
//! - `bridge_page_renders_total` (counter): pages fetched from the frontend server, by status

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const HTTP_REQUESTS_TOTAL: &str = "bridge_http_requests_total";
pub const HTTP_UPSTREAM_ERRORS_TOTAL: &str = "bridge_http_upstream_errors_total";
pub const WS_CONNECTIONS_ACTIVE: &str = "bridge_ws_connections_active";
pub const WS_CONNECT_FAILURES_TOTAL: &str = "bridge_ws_connect_failures_total";
pub const PASSTHROUGH_TOTAL: &str = "bridge_passthrough_total";
pub const PAGE_RENDERS_TOTAL: &str = "bridge_page_renders_total";

/// Install the Prometheus recorder and its scrape listener.
///
/// Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter listening");
    Ok(())
}

pub fn record_http_bridge(status: u16) {
    counter!(HTTP_REQUESTS_TOTAL, "status" => status.to_string()).increment(1);
}

pub fn record_upstream_error() {
    counter!(HTTP_UPSTREAM_ERRORS_TOTAL).increment(1);
}

pub fn ws_opened() {
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn ws_closed() {
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

pub fn record_ws_connect_failure() {
    counter!(WS_CONNECT_FAILURES_TOTAL).increment(1);
}

pub fn record_passthrough(kind: &str) {
    counter!(PASSTHROUGH_TOTAL, "kind" => kind.to_owned()).increment(1);
}

pub fn record_page_render(status: u16) {
    counter!(PAGE_RENDERS_TOTAL, "status" => status.to_string()).increment(1);
}
