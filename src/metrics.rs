use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Request and relay counters for the proxy
///
/// Thread-safe atomic counters, shared by every handler through `AppState`.
#[derive(Default)]
pub struct ProxyMetrics {
    /// Requests that reached the stream handler
    pub requests: AtomicU64,

    /// Rejected for missing parameters
    pub bad_requests: AtomicU64,

    /// Rejected by the credential check
    pub forbidden: AtomicU64,

    /// Connect/transport failures before a response arrived
    pub upstream_errors: AtomicU64,

    /// Upstream answered with a non-2xx status
    pub upstream_non_success: AtomicU64,

    /// Streams relayed to the end
    pub streams_completed: AtomicU64,

    /// Streams abandoned by the client mid-flight
    pub streams_cancelled: AtomicU64,

    /// Streams cut short by an upstream read failure
    pub stream_copy_errors: AtomicU64,

    /// Body bytes handed to clients
    pub bytes_relayed: AtomicU64,
}

impl ProxyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bad_request(&self) {
        self.bad_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forbidden(&self) {
        self.forbidden.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_status(&self) {
        self.upstream_non_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, n: usize) {
        self.bytes_relayed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.streams_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.streams_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_copy_error(&self) {
        self.stream_copy_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            bad_requests: self.bad_requests.load(Ordering::Relaxed),
            forbidden: self.forbidden.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            upstream_non_success: self.upstream_non_success.load(Ordering::Relaxed),
            streams_completed: self.streams_completed.load(Ordering::Relaxed),
            streams_cancelled: self.streams_cancelled.load(Ordering::Relaxed),
            stream_copy_errors: self.stream_copy_errors.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub bad_requests: u64,
    pub forbidden: u64,
    pub upstream_errors: u64,
    pub upstream_non_success: u64,
    pub streams_completed: u64,
    pub streams_cancelled: u64,
    pub stream_copy_errors: u64,
    pub bytes_relayed: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Proxy Metrics: {} requests ({} bad, {} forbidden), {} upstream errors, \
             streams {} completed / {} cancelled / {} failed, {:.2} MiB relayed",
            self.requests,
            self.bad_requests,
            self.forbidden,
            self.upstream_errors,
            self.streams_completed,
            self.streams_cancelled,
            self.stream_copy_errors,
            self.bytes_relayed as f64 / (1024.0 * 1024.0)
        )
    }
}
