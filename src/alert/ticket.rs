//! JSON ticket files, one per alert.

use super::{AlertDispatcher, AlertError};
use crate::detect::{AlertEvent, Sample};
use crate::telemetry::{names, MetricsSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

pub const SLO_BREACH_TITLE: &str = "SLO Breach: High p95 latency";
pub const MANUAL_TITLE: &str = "Manual alert";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub title: String,
    pub window: TicketWindow,
    pub summary: serde_json::Value,
    /// Evidence files attached to the ticket (sample exports).
    pub plots: Vec<String>,
}

impl Ticket {
    pub fn for_event(event: &AlertEvent) -> Self {
        Self {
            title: SLO_BREACH_TITLE.to_string(),
            window: TicketWindow {
                from: event.window_start,
                to: event.window_end,
            },
            summary: serde_json::json!({
                "reason": event.trigger_reason,
                "alert_id": event.id,
                "breach_count": event.breach_count,
            }),
            plots: Vec::new(),
        }
    }
}

/// Writes `ticket-<YYYYmmdd-HHMMSS>.json` files into a directory.
pub struct TicketWriter {
    dir: PathBuf,
    created: AtomicU64,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl TicketWriter {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            created: AtomicU64::new(0),
            metrics: None,
        })
    }

    /// Count created tickets in `metrics` as well.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Tickets written by this process.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub async fn create(&self, ticket: &Ticket) -> Result<PathBuf, AlertError> {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let mut path = self.dir.join(format!("ticket-{}.json", stamp));
        let mut n = 1;
        while tokio::fs::try_exists(&path).await? {
            path = self.dir.join(format!("ticket-{}-{}.json", stamp, n));
            n += 1;
        }

        let body = serde_json::to_string_pretty(ticket)?;
        tokio::fs::write(&path, body).await?;
        self.created.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.inc_counter(names::TICKETS_CREATED_TOTAL);
        }
        info!(path = %path.display(), title = %ticket.title, "Ticket created");
        Ok(path)
    }
}

/// Export `samples` as `evidence-<YYYYmmdd-HHMMSS>.json` into `dir`.
pub async fn write_evidence(
    dir: &Path,
    samples: &[Sample],
    generated_at: DateTime<Utc>,
) -> Result<PathBuf, AlertError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "evidence-{}.json",
        generated_at.format("%Y%m%d-%H%M%S")
    ));
    let body = serde_json::to_string_pretty(&serde_json::json!({
        "generated_at": generated_at,
        "count": samples.len(),
        "samples": samples,
    }))?;
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

#[async_trait::async_trait]
impl AlertDispatcher for TicketWriter {
    fn name(&self) -> &'static str {
        "tickets"
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), AlertError> {
        self.create(&Ticket::for_event(event)).await.map(|_| ())
    }
}
