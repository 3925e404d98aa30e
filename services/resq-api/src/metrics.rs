//! Prometheus metrics exposition
//!
//! - `resq_requests_total` (counter): labels `route`, `status`
//! - `resq_request_duration_seconds` (histogram): label `route`
//!
//! Key rotation counters (`resq_key_rotations_total`, `resq_rate_limited_total`,
//! `resq_keys_exhausted_total`) are emitted by the `key-pool` crate and land
//! in the same recorder.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "resq_request_duration_seconds";

/// 5ms to 60s; the upper bound matches the completion and caption timeouts.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
///
/// Explicit buckets make the duration metric render as a histogram with
/// `_bucket` lines instead of a summary.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed request against its route.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!("resq_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "route" => route).record(duration_secs);
}

/// In-process counters surfaced by `/health`.
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Requests currently being handled; reported if the drain times out.
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Mark a request as started. The guard records completion on drop.
    pub fn begin(&self, route: &'static str) -> RequestGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        RequestGuard {
            metrics: self.clone(),
            route,
            started: Instant::now(),
            status: None,
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks one request from start to response.
pub struct RequestGuard {
    metrics: ServiceMetrics,
    route: &'static str,
    started: Instant,
    status: Option<u16>,
}

impl RequestGuard {
    pub fn finish(&mut self, status: u16) {
        self.status = Some(status);
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        // Dropped without a status means the handler future was cancelled.
        let status = self.status.unwrap_or(499);
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
        if status >= 400 {
            self.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
        }
        record_request(self.route, status, self.started.elapsed().as_secs_f64());
    }
}
