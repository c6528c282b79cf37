//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by serving source and status
//! - `gateway_request_duration_seconds` (histogram): latency by serving source
//! - `fallback_resolutions_total` (counter): fallback chain outcomes
//! - `origin_fetch_failures_total` (counter): failed remote attempts by kind
//! - `cache_fill_failures_total` (counter): fetched bodies that could not be persisted
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus
//! recorder, so library code and tests record unconditionally.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

use crate::resolve::Served;

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one gateway response; `source` is `archive`, `legacy` or `none`.
pub fn record_request(source: &'static str, status: u16, start: Instant) {
    ::metrics::counter!(
        "gateway_requests_total",
        "source" => source,
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", "source" => source)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_resolution(outcome: Served) {
    ::metrics::counter!("fallback_resolutions_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_fetch_failure(kind: &'static str) {
    ::metrics::counter!("origin_fetch_failures_total", "kind" => kind).increment(1);
}

pub fn record_cache_fill_failure() {
    ::metrics::counter!("cache_fill_failures_total").increment(1);
}
