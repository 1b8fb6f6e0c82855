//! Prometheus-backed metrics sink.

use super::names;
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Fire-and-forget metric updates.
pub trait MetricsSink: Send + Sync {
    fn set_gauge(&self, name: &str, value: f64);
    fn observe_histogram(&self, name: &str, value: f64);
    fn inc_counter(&self, name: &str);
}

/// Buckets around typical WAN p95 RTTs, in seconds.
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.02, 0.035, 0.05, 0.07, 0.1, 0.15, 0.25, 0.5, 1.0];

fn help_for(name: &str) -> &'static str {
    match name {
        names::P95_LATENCY_SECONDS => "p95 round-trip latency per probe cycle",
        names::JITTER_MS => "Round-trip time standard deviation per probe cycle",
        names::PACKET_LOSS_PCT => "Packet loss percentage per probe cycle",
        names::THROUGHPUT_MBPS => "Last measured throughput",
        names::ANOMALY_SCORE => "Isolation forest anomaly score of the latest sample",
        names::CYCLES_TOTAL => "Probe cycles completed",
        names::PROBE_FAILURES_TOTAL => "Probe runs that failed or timed out",
        names::SCORER_FAILURES_TOTAL => "Anomaly model trainings that failed",
        names::ALERTS_TOTAL => "SLO breach alerts raised",
        names::ALERT_DELIVERY_FAILURES_TOTAL => "Alerts whose delivery failed",
        names::TICKETS_CREATED_TOTAL => "Tickets created",
        _ => "linkwatch metric",
    }
}

/// Registers metrics lazily, by name, on first use.
pub struct PrometheusMetrics {
    registry: Registry,
    gauges: Mutex<HashMap<String, Gauge>>,
    histograms: Mutex<HashMap<String, Histogram>>,
    counters: Mutex<HashMap<String, IntCounter>>,
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    fn register<M>(&self, name: &str, metric: &M) -> bool
    where
        M: prometheus::core::Collector + Clone + 'static,
    {
        match self.registry.register(Box::new(metric.clone())) {
            Ok(()) => true,
            Err(e) => {
                warn!(metric = %name, error = %e, "Failed to register metric");
                false
            }
        }
    }
}

impl MetricsSink for PrometheusMetrics {
    fn set_gauge(&self, name: &str, value: f64) {
        let mut gauges = self.gauges.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(g) = gauges.get(name) {
            g.set(value);
            return;
        }
        match Gauge::new(name, help_for(name)) {
            Ok(g) if self.register(name, &g) => {
                g.set(value);
                gauges.insert(name.to_string(), g);
            }
            Ok(_) => {}
            Err(e) => warn!(metric = %name, error = %e, "Invalid gauge"),
        }
    }

    fn observe_histogram(&self, name: &str, value: f64) {
        let mut histograms = self.histograms.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(h) = histograms.get(name) {
            h.observe(value);
            return;
        }
        let opts = HistogramOpts::new(name, help_for(name)).buckets(LATENCY_BUCKETS.to_vec());
        match Histogram::with_opts(opts) {
            Ok(h) if self.register(name, &h) => {
                h.observe(value);
                histograms.insert(name.to_string(), h);
            }
            Ok(_) => {}
            Err(e) => warn!(metric = %name, error = %e, "Invalid histogram"),
        }
    }

    fn inc_counter(&self, name: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(c) = counters.get(name) {
            c.inc();
            return;
        }
        match IntCounter::new(name, help_for(name)) {
            Ok(c) if self.register(name, &c) => {
                c.inc();
                counters.insert(name.to_string(), c);
            }
            Ok(_) => {}
            Err(e) => warn!(metric = %name, error = %e, "Invalid counter"),
        }
    }
}
