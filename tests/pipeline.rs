//! End-to-end sampling-to-alert pipeline tests with scripted probes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use linkwatch::alert::{AlertFanout, TicketWriter};
use linkwatch::config::MonitorConfig;
use linkwatch::detect::incident::IncidentManager;
use linkwatch::detect::{
    AnomalyScorer, BreachConfig, BreachState, BreachTracker, Sample, SampleBuffer, ScorerConfig,
};
use linkwatch::monitor::Monitor;
use linkwatch::probes::{LatencyProbe, LatencyReport, ProbeError};
use linkwatch::scheduler::ProbeScheduler;
use linkwatch::telemetry::{LogSink, PrometheusMetrics};
use linkwatch::throughput::{ThroughputError, ThroughputProbe, ThroughputReport};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 8, 1, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

fn breach_config() -> BreachConfig {
    BreachConfig {
        threshold_seconds: 0.070,
        window: Duration::from_secs(300),
        min_breach_samples: 10,
        boundary_slack: Duration::ZERO,
    }
}

#[test]
fn buffer_keeps_newest_capacity_samples_in_order() {
    let mut buffer = SampleBuffer::new(2000);
    for i in 0..2001 {
        buffer.append(Sample::new(at(i), 0.01, 0.0, 0.0, i as f64));
    }
    assert_eq!(buffer.len(), 2000);
    let all = buffer.range_since(at(0));
    assert_eq!(all.first().map(|s| s.throughput_mbps), Some(1.0));
    assert_eq!(all.last().map(|s| s.throughput_mbps), Some(2000.0));
    assert_eq!(buffer.range_since(at(1500)), buffer.range_since(at(1500)));
}

#[test]
fn scorer_warms_up_then_stays_ready() {
    let mut scorer = AnomalyScorer::new(ScorerConfig::default());
    for i in 0..29 {
        let score = scorer.add([0.010 + (i % 5) as f64 * 0.001, 1.0, 0.0, 0.0]);
        assert_eq!(score, 0.0);
        assert!(!scorer.is_ready());
    }
    for i in 0..200 {
        scorer.add([0.010 + (i % 5) as f64 * 0.001, 1.0 + (i % 3) as f64, 0.0, 0.0]);
        assert!(scorer.is_ready());
    }
    assert_eq!(scorer.window_len(), 120);
}

#[test]
fn scorer_is_deterministic_for_a_seed() {
    let inputs: Vec<[f64; 4]> = (0..60)
        .map(|i| {
            let spike = if i == 50 { 0.3 } else { 0.0 };
            [0.012 + (i % 7) as f64 * 0.0005 + spike, 1.0 + (i % 4) as f64, 0.0, 0.0]
        })
        .collect();
    let run = || {
        let mut scorer = AnomalyScorer::new(ScorerConfig::default());
        inputs.iter().map(|f| scorer.add(*f)).collect::<Vec<f64>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn sustained_breach_alerts_once_and_resets() {
    let mut tracker = BreachTracker::new(breach_config());
    let alerts: Vec<_> = (0..12)
        .filter_map(|i| tracker.observe(at(i * 30), 0.120))
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].window_start, at(0));
    assert_eq!(alerts[0].window_end, at(300));

    // The sample after the alert starts a fresh episode.
    assert_eq!(tracker.state(), BreachState::Accumulating);
    assert_eq!(tracker.accumulated(), 1);
    assert!(tracker.observe(at(360), 0.120).is_none());
}

#[test]
fn short_burst_never_alerts() {
    let mut tracker = BreachTracker::new(breach_config());
    for i in 0..3 {
        assert!(tracker.observe(at(i * 30), 0.150).is_none());
    }
    for i in 3..20 {
        assert!(tracker.observe(at(i * 30), 0.020).is_none());
    }
    assert_eq!(tracker.state(), BreachState::Normal);
}

struct ScriptedLatency {
    p95: Mutex<f64>,
}

#[async_trait::async_trait]
impl LatencyProbe for ScriptedLatency {
    async fn run(&self, _host: &str, count: u32, _degrade: bool) -> Result<LatencyReport, ProbeError> {
        Ok(LatencyReport {
            p95_latency_seconds: *self.p95.lock().unwrap(),
            jitter_ms: 2.0,
            loss_pct: 0.0,
            sample_count: count as usize,
        })
    }
}

struct UnreachableIperf {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl ThroughputProbe for UnreachableIperf {
    async fn run(&self, _host: &str) -> Result<ThroughputReport, ThroughputError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ThroughputError::Iperf3Failed {
            code: 1,
            stderr: "unable to connect to server".to_string(),
        })
    }
}

struct NullLog;

impl LogSink for NullLog {
    fn write_structured(&self, _record: &serde_json::Value) {}
}

#[tokio::test]
async fn scheduler_breach_episode_writes_ticket_and_incident() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_path_buf();
    let config = Arc::new(
        MonitorConfig::from_lookup(|key| match key {
            "TICKETS_DIR" => Some(base.join("tickets").display().to_string()),
            "REPORTS_DIR" => Some(base.join("reports").display().to_string()),
            "DEGRADE_FLAG_PATH" => Some(base.join(".degrade.flag").display().to_string()),
            _ => None,
        })
        .unwrap(),
    );

    let pool = linkwatch::storage::open_pool(base.join("linkwatch.db")).unwrap();
    let incidents = IncidentManager::new(pool);
    let metrics = Arc::new(PrometheusMetrics::new());
    let tickets = Arc::new(
        TicketWriter::new(&config.paths.tickets_dir)
            .unwrap()
            .with_metrics(metrics.clone()),
    );
    let fanout = AlertFanout::new()
        .with(Arc::new(incidents.clone()))
        .with(tickets.clone());

    let monitor = Arc::new(Monitor::new(
        config.detect.buffer_capacity,
        config.scorer_config(),
        config.breach_config(),
    ));
    let latency = Arc::new(ScriptedLatency { p95: Mutex::new(0.015) });
    let iperf = Arc::new(UnreachableIperf { calls: AtomicUsize::new(0) });
    let mut scheduler = ProbeScheduler::new(
        config.clone(),
        monitor.clone(),
        latency.clone(),
        iperf.clone(),
        metrics.clone(),
        Arc::new(NullLog),
        Arc::new(fanout),
    );

    // Healthy baseline, then a sustained latency regression.
    let mut alerts = 0;
    for i in 0..36 {
        if i == 20 {
            *latency.p95.lock().unwrap() = 0.140;
        }
        let report = scheduler.run_cycle(at(i * 30)).await;
        if report.alert.is_some() {
            alerts += 1;
            assert_eq!(report.alert_delivered, Some(true));
        }
    }

    // Breaches start at cycle 20; the 10th one (cycle 29) completes the episode
    // and the six that follow are not enough for a second.
    assert_eq!(alerts, 1);
    assert!(monitor.is_ready().await);
    assert_eq!(incidents.list_recent(10).unwrap().len(), 1);
    assert_eq!(tickets.created(), 1);
    assert_eq!(std::fs::read_dir(&config.paths.tickets_dir).unwrap().count(), 1);

    // 08:01:00 to 08:18:30 crosses 08:05, 08:10 and 08:15.
    assert_eq!(iperf.calls.load(Ordering::SeqCst), 3);
    let exported = metrics.export();
    assert!(exported.contains("linkwatch_alerts_total 1"));
    assert!(exported.contains("linkwatch_tickets_created_total 1"));
    assert!(exported.contains("linkwatch_probe_failures_total 3"));
    assert!(exported.contains("linkwatch_cycles_total 36"));
}
