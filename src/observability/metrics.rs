//! Metrics collection and exposition.
//!
//! # Metrics
//! - `emo_proxy_requests_total` (counter): requests by route class, status
//! - `emo_proxy_request_duration_seconds` (histogram): latency by route class
//! - `emo_proxy_upstream_errors_total` (counter): failed forwards by route class, kind
//! - `emo_proxy_overrides_total` (counter): applied overrides by strategy, disposition
//! - `emo_proxy_chain_total` (counter): speech chain runs by outcome
//! - `emo_proxy_history_failures_total` (counter): history writes that failed
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed, so tests need no setup
//! - Prometheus exposition runs on its own listener, away from proxied traffic

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint. Must run inside the runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    metrics::counter!(
        "emo_proxy_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("emo_proxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error(route: &'static str, kind: &'static str) {
    metrics::counter!(
        "emo_proxy_upstream_errors_total",
        "route" => route,
        "kind" => kind
    )
    .increment(1);
}

pub fn record_override(strategy: &'static str, disposition: &'static str) {
    metrics::counter!(
        "emo_proxy_overrides_total",
        "strategy" => strategy,
        "disposition" => disposition
    )
    .increment(1);
}

pub fn record_chain(outcome: &'static str) {
    metrics::counter!("emo_proxy_chain_total", "outcome" => outcome).increment(1);
}

pub fn record_history_failure() {
    metrics::counter!("emo_proxy_history_failures_total").increment(1);
}
