//! Metrics and structured-log sinks fed by the probe scheduler.
//!
//! Both sinks are fire-and-forget: nothing they do can fail a probe cycle.

pub mod log;
pub mod metrics;

pub use self::log::{JsonLinesLog, LogSink};
pub use self::metrics::{MetricsSink, PrometheusMetrics};

/// Metric names published by the scheduler and API.
pub mod names {
    pub const P95_LATENCY_SECONDS: &str = "linkwatch_p95_latency_seconds";
    pub const JITTER_MS: &str = "linkwatch_jitter_ms";
    pub const PACKET_LOSS_PCT: &str = "linkwatch_packet_loss_pct";
    pub const THROUGHPUT_MBPS: &str = "linkwatch_throughput_mbps";
    pub const ANOMALY_SCORE: &str = "linkwatch_anomaly_score";
    pub const CYCLES_TOTAL: &str = "linkwatch_cycles_total";
    pub const PROBE_FAILURES_TOTAL: &str = "linkwatch_probe_failures_total";
    pub const SCORER_FAILURES_TOTAL: &str = "linkwatch_scorer_failures_total";
    pub const ALERTS_TOTAL: &str = "linkwatch_alerts_total";
    pub const ALERT_DELIVERY_FAILURES_TOTAL: &str = "linkwatch_alert_delivery_failures_total";
    pub const TICKETS_CREATED_TOTAL: &str = "linkwatch_tickets_created_total";
}
