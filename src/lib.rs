//! linkwatch -- single-link network quality monitor.
//!
//! Measures latency, jitter, loss and throughput to one target on a fixed
//! cadence, scores every sample with a sliding-window isolation forest, and
//! raises one alert per sustained p95 latency SLO breach.

pub mod alert;
pub mod api;
pub mod config;
pub mod detect;
pub mod monitor;
pub mod probes;
pub mod scheduler;
pub mod storage;
pub mod telemetry;
pub mod throughput;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::alert::{AlertFanout, TicketWriter, WebhookDispatcher};
use crate::config::MonitorConfig;
use crate::detect::incident::IncidentManager;
use crate::monitor::Monitor;
use crate::probes::PingProbe;
use crate::scheduler::ProbeScheduler;
use crate::telemetry::{JsonLinesLog, PrometheusMetrics};
use crate::throughput::Iperf3Probe;

/// Start the linkwatch daemon: API server, probe scheduler, and alerting.
pub async fn serve(config: MonitorConfig, bind: &str, db_path: &str) -> Result<()> {
    config
        .ensure_dirs()
        .context("failed to create ticket/report directories")?;
    let config = Arc::new(config);

    // 1. Initialize Storage
    tracing::info!(%db_path, "Initializing database");
    let pool = storage::open_pool(db_path)?;
    let incidents = IncidentManager::new(pool);

    // 2. Shared state and sinks
    let monitor = Arc::new(Monitor::new(
        config.detect.buffer_capacity,
        config.scorer_config(),
        config.breach_config(),
    ));
    let metrics = Arc::new(PrometheusMetrics::new());
    let tickets = Arc::new(
        TicketWriter::new(&config.paths.tickets_dir)
            .with_context(|| {
                format!(
                    "failed to open tickets directory {}",
                    config.paths.tickets_dir.display()
                )
            })?
            .with_metrics(metrics.clone()),
    );

    let mut fanout = AlertFanout::new()
        .with(Arc::new(incidents.clone()))
        .with(tickets.clone())
        .with_timeout(config.alert_timeout());
    if let Some(url) = &config.alert.webhook_url {
        let webhook = WebhookDispatcher::new(url.as_str(), config.alert_timeout())
            .context("failed to build webhook client")?;
        tracing::info!(%url, "Webhook alerts enabled");
        fanout = fanout.with(Arc::new(webhook));
    }

    // 3. Start Scheduler Engine (background task)
    let scheduler = ProbeScheduler::new(
        config.clone(),
        monitor.clone(),
        Arc::new(PingProbe::default()),
        Arc::new(Iperf3Probe::new(config.probe.iperf_seconds)),
        metrics.clone(),
        Arc::new(JsonLinesLog::new(&config.paths.log_path)),
        Arc::new(fanout),
    );
    tokio::spawn(scheduler::run_scheduler_loop(scheduler));

    // 4. Start API Server
    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;
    let app = api::router(api::state::AppState {
        monitor,
        metrics,
        tickets,
        incidents,
        config,
    });

    tracing::info!(%addr, "linkwatch listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
