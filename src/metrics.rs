//! Gateway metrics
//!
//! Counters, gauges and histograms recorded through the `metrics` facade.
//! Nothing is exported unless a recorder is installed, which
//! [`init_metrics_exporter`] does when the `prometheus` feature is enabled.
//!
//! # Metrics
//!
//! - `fngate_exchanges_total`: Counter of requests delivered to a session
//! - `fngate_exchange_duration_seconds`: Histogram of request/reply latency
//! - `fngate_exchange_outcomes_total`: Counter of exchanges by outcome
//! - `fngate_exchanges_in_flight`: Gauge of requests awaiting a reply
//! - `fngate_sessions_total`: Counter of session resolutions by kind
//! - `fngate_sessions_evicted_total`: Counter of TTL evictions
//! - `fngate_push_deliveries_total`: Counter of server pushes by outcome
//!
//! # Examples
//!
//! ```
//! use fngate::metrics::ExchangeMetrics;
//!
//! let m = ExchangeMetrics::new("tools/call");
//! m.record_outcome("resolved");
//! ```

use metrics::{counter, decrement_gauge, histogram, increment_counter, increment_gauge};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Metrics for one request/reply exchange.
///
/// Increments the in-flight gauge on creation; the gauge is released exactly
/// once, either by [`record_outcome`](Self::record_outcome) or on drop.
#[derive(Debug)]
pub struct ExchangeMetrics {
    method: String,
    start: Instant,
    recorded: AtomicBool,
}

impl ExchangeMetrics {
    pub fn new(method: &str) -> Self {
        increment_counter!("fngate_exchanges_total", "method" => method.to_string());
        increment_gauge!("fngate_exchanges_in_flight", 1.0);

        Self {
            method: method.to_string(),
            start: Instant::now(),
            recorded: AtomicBool::new(false),
        }
    }

    /// Record how the exchange ended ("resolved", "empty", "timeout",
    /// "rejected"). Later calls are ignored.
    pub fn record_outcome(&self, outcome: &str) {
        if self.recorded.swap(true, Ordering::SeqCst) {
            return;
        }

        histogram!(
            "fngate_exchange_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "method" => self.method.clone(),
            "outcome" => outcome.to_string()
        );
        increment_counter!(
            "fngate_exchange_outcomes_total",
            "method" => self.method.clone(),
            "outcome" => outcome.to_string()
        );
        decrement_gauge!("fngate_exchanges_in_flight", 1.0);
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    fn is_recorded(&self) -> bool {
        self.recorded.load(Ordering::SeqCst)
    }
}

impl Drop for ExchangeMetrics {
    fn drop(&mut self) {
        if !self.is_recorded() {
            decrement_gauge!("fngate_exchanges_in_flight", 1.0);
        }
    }
}

/// A session was created ("created") or resumed ("resumed").
pub fn record_session(kind: &'static str) {
    increment_counter!("fngate_sessions_total", "kind" => kind);
}

/// `count` sessions were evicted for idleness.
pub fn record_evictions(count: usize) {
    if count > 0 {
        counter!("fngate_sessions_evicted_total", count as u64);
    }
}

/// A server push was "delivered", "dropped" (no sink) or "failed".
pub fn record_push(outcome: &'static str) {
    increment_counter!("fngate_push_deliveries_total", "outcome" => outcome);
}

/// Installs the Prometheus exporter when the `prometheus` feature is
/// enabled; a no-op otherwise.
///
/// `listen` overrides the exporter's default `0.0.0.0:9000` scrape address.
pub fn init_metrics_exporter(listen: Option<std::net::SocketAddr>) {
    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let mut builder = PrometheusBuilder::new();
        if let Some(addr) = listen {
            builder = builder.with_http_listener(addr);
        }
        let _ = builder.install().map_err(|e| {
            tracing::warn!("Failed to install Prometheus exporter: {}", e);
        });
    }
    #[cfg(not(feature = "prometheus"))]
    {
        if listen.is_some() {
            tracing::debug!("Metrics listener configured but prometheus feature is disabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_metrics_creation() {
        let m = ExchangeMetrics::new("ping");
        assert_eq!(m.method(), "ping");
        assert!(!m.is_recorded());
    }

    #[test]
    fn test_exchange_metrics_record_once() {
        let m = ExchangeMetrics::new("tools/call");
        m.record_outcome("timeout");
        assert!(m.is_recorded());
        // Second call is ignored
        m.record_outcome("resolved");
        assert!(m.is_recorded());
    }

    #[test]
    fn test_exchange_metrics_drop_without_recording() {
        {
            let _m = ExchangeMetrics::new("tools/list");
        }
    }

    #[test]
    fn test_exchange_metrics_elapsed() {
        let m = ExchangeMetrics::new("ping");
        assert!(m.elapsed().as_millis() < 100);
    }

    #[test]
    fn test_free_recorders_do_not_panic() {
        record_session("created");
        record_session("resumed");
        record_evictions(0);
        record_evictions(3);
        record_push("dropped");
    }

    #[test]
    fn test_init_metrics_exporter_without_listener() {
        init_metrics_exporter(None);
    }
}
