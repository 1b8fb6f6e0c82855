use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{next_delay, throughput_due, DegradeSwitch};
use crate::alert::{dispatch_bounded, AlertDispatcher};
use crate::config::MonitorConfig;
use crate::detect::{AlertEvent, Sample};
use crate::monitor::Monitor;
use crate::probes::{run_latency_bounded, LatencyProbe, LatencyReport};
use crate::telemetry::{names, LogSink, MetricsSink};
use crate::throughput::{run_throughput_bounded, ThroughputProbe};

/// What one probe cycle measured and decided.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sample: Sample,
    pub score: f64,
    pub ready: bool,
    /// Score at or above the configured anomaly threshold.
    pub anomalous: bool,
    pub degraded: bool,
    pub latency_failed: bool,
    pub throughput_ran: bool,
    pub throughput_failed: bool,
    pub alert: Option<AlertEvent>,
    /// `Some(false)` when an alert was raised but delivery failed.
    pub alert_delivered: Option<bool>,
    pub elapsed: Duration,
}

pub struct ProbeScheduler {
    config: Arc<MonitorConfig>,
    monitor: Arc<Monitor>,
    latency: Arc<dyn LatencyProbe>,
    throughput: Arc<dyn ThroughputProbe>,
    metrics: Arc<dyn MetricsSink>,
    log: Arc<dyn LogSink>,
    alerts: Arc<dyn AlertDispatcher>,
    degrade: DegradeSwitch,
    last_throughput_minute: Option<i64>,
}

impl ProbeScheduler {
    pub fn new(
        config: Arc<MonitorConfig>,
        monitor: Arc<Monitor>,
        latency: Arc<dyn LatencyProbe>,
        throughput: Arc<dyn ThroughputProbe>,
        metrics: Arc<dyn MetricsSink>,
        log: Arc<dyn LogSink>,
        alerts: Arc<dyn AlertDispatcher>,
    ) -> Self {
        let degrade = DegradeSwitch::new(&config.paths.degrade_flag_path);
        Self {
            config,
            monitor,
            latency,
            throughput,
            metrics,
            log,
            alerts,
            degrade,
            last_throughput_minute: None,
        }
    }

    /// Handle for toggling synthetic degradation while the loop runs.
    pub fn degrade_switch(&self) -> DegradeSwitch {
        self.degrade.clone()
    }

    /// Run one cycle stamped `now`: probe, ingest, publish, alert.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let started = Instant::now();
        let probe = &self.config.probe;
        let degraded = self.degrade.is_on();

        let (latency, latency_failed) = match run_latency_bounded(
            self.latency.as_ref(),
            &probe.target_host,
            probe.ping_count,
            degraded,
            self.config.probe_timeout(),
        )
        .await
        {
            Ok(report) => (report, false),
            Err(e) => {
                warn!(host = %probe.target_host, error = %e, "Latency probe failed, recording zeros");
                self.metrics.inc_counter(names::PROBE_FAILURES_TOTAL);
                (LatencyReport::default(), true)
            }
        };

        let minute = now.timestamp().div_euclid(60);
        let throughput_ran =
            throughput_due(minute, probe.throughput_every_minutes, self.last_throughput_minute);
        let mut throughput_failed = false;
        let mut throughput_mbps = 0.0;
        if throughput_ran {
            self.last_throughput_minute = Some(minute);
            match run_throughput_bounded(
                self.throughput.as_ref(),
                &probe.iperf_host,
                self.config.throughput_timeout(),
            )
            .await
            {
                Ok(report) => throughput_mbps = report.throughput_mbps,
                Err(e) => {
                    warn!(host = %probe.iperf_host, error = %e, "Throughput probe failed, recording zero");
                    self.metrics.inc_counter(names::PROBE_FAILURES_TOTAL);
                    throughput_failed = true;
                }
            }
        }

        let sample = Sample::new(
            now,
            latency.p95_latency_seconds,
            latency.jitter_ms,
            latency.loss_pct,
            throughput_mbps,
        );
        let ingested = self.monitor.ingest(sample.clone()).await;
        if ingested.scorer_failed {
            self.metrics.inc_counter(names::SCORER_FAILURES_TOTAL);
        }
        let anomalous = ingested.ready && ingested.score >= self.config.detect.anomaly_threshold;

        self.publish(&sample, ingested.score, throughput_ran && !throughput_failed);
        self.log.write_structured(&json!({
            "ts": sample.timestamp.to_rfc3339(),
            "p95_s": sample.p95_latency_seconds,
            "jitter_ms": sample.jitter_ms,
            "loss_pct": sample.loss_pct,
            "throughput_mbps": sample.throughput_mbps,
            "anomaly": ingested.score,
            "anomalous": anomalous,
            "degraded": degraded,
        }));

        let alert_delivered = match &ingested.alert {
            Some(event) => Some(self.deliver(event).await),
            None => None,
        };

        CycleReport {
            sample,
            score: ingested.score,
            ready: ingested.ready,
            anomalous,
            degraded,
            latency_failed,
            throughput_ran,
            throughput_failed,
            alert: ingested.alert,
            alert_delivered,
            elapsed: started.elapsed(),
        }
    }

    fn publish(&self, sample: &Sample, score: f64, throughput_measured: bool) {
        self.metrics
            .observe_histogram(names::P95_LATENCY_SECONDS, sample.p95_latency_seconds);
        self.metrics.set_gauge(names::JITTER_MS, sample.jitter_ms);
        self.metrics.set_gauge(names::PACKET_LOSS_PCT, sample.loss_pct);
        if throughput_measured {
            self.metrics
                .set_gauge(names::THROUGHPUT_MBPS, sample.throughput_mbps);
        }
        self.metrics.set_gauge(names::ANOMALY_SCORE, score);
        self.metrics.inc_counter(names::CYCLES_TOTAL);
    }

    async fn deliver(&self, event: &AlertEvent) -> bool {
        self.metrics.inc_counter(names::ALERTS_TOTAL);
        info!(
            id = %event.id,
            reason = %event.trigger_reason,
            breaches = event.breach_count,
            from = %event.window_start,
            to = %event.window_end,
            "SLO breach alert raised"
        );
        match dispatch_bounded(self.alerts.as_ref(), event, self.config.alert_timeout()).await {
            Ok(()) => true,
            Err(e) => {
                error!(id = %event.id, error = %e, "Alert delivery failed");
                self.metrics.inc_counter(names::ALERT_DELIVERY_FAILURES_TOTAL);
                false
            }
        }
    }
}

/// Main scheduler loop. Never returns; cycles run back to back at the
/// configured interval.
pub async fn run_scheduler_loop(mut scheduler: ProbeScheduler) {
    let interval = scheduler.config.probe_interval();
    info!(
        host = %scheduler.config.probe.target_host,
        interval_secs = interval.as_secs(),
        "Scheduler engine started"
    );

    loop {
        let report = scheduler.run_cycle(Utc::now()).await;
        debug!(
            p95_s = report.sample.p95_latency_seconds,
            jitter_ms = report.sample.jitter_ms,
            loss_pct = report.sample.loss_pct,
            throughput_mbps = report.sample.throughput_mbps,
            score = report.score,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Cycle complete"
        );
        if report.anomalous {
            warn!(score = report.score, "Anomalous sample");
        }
        tokio::time::sleep(next_delay(interval, report.elapsed)).await;
    }
}
