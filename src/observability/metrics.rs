//! Metrics collection and exposition.
//!
//! # Metrics
//! - `extproc_decisions_total` (counter): verdicts by `decision`
//!   (`allow`, `deny_unauthorized`, `deny_quota`, `passthrough`)
//! - `extproc_streams_active` (gauge): streams currently being processed
//! - `extproc_streams_rejected_total` (counter): streams refused by admission control
//! - `extproc_api_keys_loaded` (gauge): keys in the key store

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus exporter listening on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_decision(decision: &'static str) {
    metrics::counter!("extproc_decisions_total", "decision" => decision).increment(1);
}

pub fn stream_opened() {
    metrics::gauge!("extproc_streams_active").increment(1.0);
}

pub fn stream_closed() {
    metrics::gauge!("extproc_streams_active").decrement(1.0);
}

pub fn record_stream_rejected() {
    metrics::counter!("extproc_streams_rejected_total").increment(1);
}

pub fn record_keys_loaded(count: usize) {
    metrics::gauge!("extproc_api_keys_loaded").set(count as f64);
}
