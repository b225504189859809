//! C9 — request counts, status histograms, latency, and a diagnostic
//! top-N peer counter.
use dashmap::DashMap;
use prometheus::{register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge};
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::connect_events::PeerId;

/// Monotonic message counters, the public-facing half of [`Metrics`].
#[derive(Debug, Default)]
pub struct Stats {
    pub messages_sent: AtomicU64,
    pub messages_recvd: AtomicU64,
}

impl Stats {
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.messages_sent.load(Ordering::Relaxed),
            self.messages_recvd.load(Ordering::Relaxed),
        )
    }
}

/// Prometheus-backed request metrics, mirroring the counters the upstream
/// `msg_sender.go` updates around every `client.Do` call.
pub struct Metrics {
    pub requests_in_flight: IntGauge,
    pub requests_failure: IntCounter,
    pub requests_body_failure: IntCounter,
    pub response_size: Histogram,
    pub request_time: Histogram,
    pub status_counts: IntCounterVec,
}

impl Metrics {
    /// Constructs metrics registered with the default prometheus registry.
    /// Falls back to unregistered (local-only) instances if registration
    /// fails (e.g. a second instance of this crate in the same process),
    /// since metrics are diagnostic, not load-bearing.
    pub fn new() -> Self {
        let requests_in_flight = register_int_gauge!("bitswap_httpnet_requests_in_flight", "in-flight HTTP requests")
            .unwrap_or_else(|_| IntGauge::new("bitswap_httpnet_requests_in_flight_local", "local").unwrap());
        let requests_failure = register_int_counter!("bitswap_httpnet_requests_failure_total", "failed HTTP requests")
            .unwrap_or_else(|_| IntCounter::new("bitswap_httpnet_requests_failure_total_local", "local").unwrap());
        let requests_body_failure = register_int_counter!(
            "bitswap_httpnet_requests_body_failure_total",
            "HTTP responses whose body could not be read"
        )
        .unwrap_or_else(|_| IntCounter::new("bitswap_httpnet_requests_body_failure_total_local", "local").unwrap());
        let response_size = register_histogram!("bitswap_httpnet_response_size_bytes", "HTTP response body size")
            .unwrap_or_else(|_| Histogram::with_opts(prometheus::HistogramOpts::new("local_response_size", "local")).unwrap());
        let request_time = register_histogram!("bitswap_httpnet_request_seconds", "HTTP request duration")
            .unwrap_or_else(|_| Histogram::with_opts(prometheus::HistogramOpts::new("local_request_seconds", "local")).unwrap());
        let status_counts = register_int_counter_vec!(
            "bitswap_httpnet_status_total",
            "HTTP responses by status code",
            &["status"]
        )
        .unwrap_or_else(|_| {
            IntCounterVec::new(
                prometheus::Opts::new("local_status_total", "local"),
                &["status"],
            )
            .unwrap()
        });

        Metrics {
            requests_in_flight,
            requests_failure,
            requests_body_failure,
            response_size,
            request_time,
            status_counts,
        }
    }

    pub fn update_status_counter(&self, status: u16) {
        self.status_counts.with_label_values(&[&status.to_string()]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

/// Per-peer diagnostic counter with a top-N projection, used only for
/// logging (never routing decisions). Grounded on the upstream
/// `providerquerymanager` package's `counter` type.
#[derive(Debug, Default)]
pub struct PeerCounter {
    counts: DashMap<PeerId, i64>,
}

impl PeerCounter {
    pub fn new() -> Self {
        PeerCounter::default()
    }

    /// Adds `delta` to `peer`'s count and returns the new total.
    pub fn add(&self, peer: PeerId, delta: i64) -> i64 {
        let mut entry = self.counts.entry(peer).or_insert(0);
        *entry += delta;
        *entry
    }

    /// Returns the `n` peers with the highest counts, descending. Ties are
    /// broken arbitrarily (unspecified, per spec).
    pub fn top_n(&self, n: usize) -> Vec<(PeerId, i64)> {
        let mut items: Vec<(PeerId, i64)> = self.counts.iter().map(|e| (e.key().clone(), *e.value())).collect();
        items.sort_by_key(|(_, v)| Reverse(*v));
        items.truncate(n);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_n_sorts_descending() {
        let counter = PeerCounter::new();
        counter.add(PeerId("a".into()), 3);
        counter.add(PeerId("b".into()), 10);
        counter.add(PeerId("c".into()), 1);
        let top = counter.top_n(2);
        assert_eq!(top[0].0, PeerId("b".into()));
        assert_eq!(top[1].0, PeerId("a".into()));
    }

    #[test]
    fn add_accumulates() {
        let counter = PeerCounter::new();
        counter.add(PeerId("a".into()), 3);
        let total = counter.add(PeerId("a".into()), 4);
        assert_eq!(total, 7);
    }

    #[test]
    fn stats_are_monotonic_under_concurrent_adds() {
        let stats = Stats::default();
        for _ in 0..1000 {
            stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        }
        let (sent, _) = stats.snapshot();
        assert_eq!(sent, 1000);
    }
}
