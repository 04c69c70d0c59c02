//! Observability: request metrics and structured tracing hooks.

use crate::errors::CanvasError;
use crate::resilience::RateTier;
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Metrics collector for Canvas API operations.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Logical requests that reached the network.
    requests_total: AtomicU64,
    /// Successful requests.
    requests_success: AtomicU64,
    /// Failed requests.
    requests_failed: AtomicU64,
    /// Retry attempts.
    requests_retried: AtomicU64,
    /// Attempts held back by the rate governor.
    requests_throttled: AtomicU64,
    /// GETs served from the cache.
    cache_hits: AtomicU64,
    /// GETs that had to go to the network.
    cache_misses: AtomicU64,
    /// Total request latency in microseconds.
    latency_total_us: AtomicU64,
    /// Request count for latency calculation.
    latency_count: AtomicU64,
}

impl Metrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful request.
    pub fn record_success(&self) {
        self.requests_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed request.
    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a retry attempt.
    pub fn record_retry(&self) {
        self.requests_retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an attempt that waited on the rate governor.
    pub fn record_throttled(&self) {
        self.requests_throttled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records request latency.
    pub fn record_latency(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.latency_total_us.fetch_add(us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the average latency in microseconds.
    pub fn average_latency_us(&self) -> u64 {
        let total = self.latency_total_us.load(Ordering::Relaxed);
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            total / count
        }
    }

    /// Gets a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_retried: self.requests_retried.load(Ordering::Relaxed),
            requests_throttled: self.requests_throttled.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            average_latency_us: self.average_latency_us(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Requests that reached the network.
    pub requests_total: u64,
    /// Successful requests.
    pub requests_success: u64,
    /// Failed requests.
    pub requests_failed: u64,
    /// Retry attempts.
    pub requests_retried: u64,
    /// Attempts held back by the rate governor.
    pub requests_throttled: u64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
    /// Average latency in microseconds.
    pub average_latency_us: u64,
}

/// Request timer for measuring latency.
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<Metrics>,
}

impl RequestTimer {
    /// Creates a new request timer.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        metrics.record_request();
        Self {
            start: Instant::now(),
            metrics,
        }
    }

    /// Records success and latency.
    pub fn success(self) {
        self.metrics.record_success();
        self.metrics.record_latency(self.start.elapsed());
    }

    /// Records failure and latency.
    pub fn failure(self) {
        self.metrics.record_failure();
        self.metrics.record_latency(self.start.elapsed());
    }

    /// Gets elapsed time without recording.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Tracing hooks for Canvas API operations.
pub struct TracingHooks;

impl TracingHooks {
    /// Logs the start of an API request attempt.
    pub fn on_request_start(method: &str, url: &str, attempt: u32, headers: &HeaderMap) {
        debug!(
            method = %method,
            url = %url,
            attempt,
            headers = ?redacted_headers(headers),
            "Canvas API request started"
        );
    }

    /// Logs the completion of an API request.
    pub fn on_request_complete(method: &str, url: &str, status: u16, duration: Duration) {
        debug!(
            method = %method,
            url = %url,
            status,
            duration_ms = duration.as_millis() as u64,
            "Canvas API request completed"
        );
    }

    /// Logs a request error.
    pub fn on_request_error(method: &str, url: &str, error: &CanvasError) {
        debug!(
            method = %method,
            url = %url,
            error = %error,
            "Canvas API request failed"
        );
    }

    /// Logs a scheduled retry.
    pub fn on_retry(path: &str, attempt: u32, delay: Duration, error: &CanvasError) {
        warn!(
            path = %path,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying Canvas API request"
        );
    }

    /// Logs a cache hit.
    pub fn on_cache_hit(url: &str) {
        trace!(url = %url, "Serving response from cache");
    }

    /// Logs a cache miss.
    pub fn on_cache_miss(url: &str) {
        trace!(url = %url, "Response not cached");
    }

    /// Logs the launch of capability discovery.
    pub fn on_capabilities_probe_started(path: &str) {
        debug!(path = %path, "Starting Canvas capability discovery");
    }

    /// Logs a rate tier transition.
    pub fn on_tier_change(tier: RateTier, remaining: f64, total: f64) {
        debug!(tier = %tier, remaining, total, "Quota snapshot moved rate tier");
    }

    /// Logs a published capability descriptor.
    pub fn on_capabilities_published(version: &str, feature_count: usize) {
        info!(version = %version, features = feature_count, "Canvas capabilities discovered");
    }

    /// Logs a failed discovery call.
    pub fn on_capabilities_failed(error: &CanvasError) {
        warn!(error = %error, "Canvas capability discovery failed");
    }
}

/// Sensitive headers that should be redacted in logs.
pub const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Redacts sensitive values in headers.
pub fn redact_header(name: &str, value: &str) -> String {
    if SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

fn redacted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("<binary>");
            (name.to_string(), redact_header(name.as_str(), value))
        })
        .collect()
}
