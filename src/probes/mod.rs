//! Latency/jitter/loss probing.

pub mod icmp;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use self::icmp::PingProbe;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} produced no usable output (exit code {code:?})")]
    NoOutput { tool: &'static str, code: Option<i32> },

    #[error("{tool} output could not be parsed: {reason}")]
    Parse { tool: &'static str, reason: String },

    #[error("{tool} timed out after {timeout:?}")]
    Timeout { tool: &'static str, timeout: Duration },
}

/// Parsed result of one latency probe run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub p95_latency_seconds: f64,
    pub jitter_ms: f64,
    pub loss_pct: f64,
    /// RTT replies the figures were computed from.
    pub sample_count: usize,
}

impl LatencyReport {
    /// Synthetic degradation used to exercise alerting without a bad network:
    /// +50 ms p95, +5 ms jitter, +2 % loss.
    pub fn degraded(mut self) -> Self {
        self.p95_latency_seconds += 0.05;
        self.jitter_ms += 5.0;
        self.loss_pct = (self.loss_pct + 2.0).min(100.0);
        self
    }
}

/// Measures round-trip latency to a host.
#[async_trait::async_trait]
pub trait LatencyProbe: Send + Sync {
    async fn run(&self, host: &str, count: u32, degrade: bool) -> Result<LatencyReport, ProbeError>;
}

/// Run `probe`, converting a timeout into [`ProbeError::Timeout`].
pub async fn run_latency_bounded(
    probe: &dyn LatencyProbe,
    host: &str,
    count: u32,
    degrade: bool,
    timeout: Duration,
) -> Result<LatencyReport, ProbeError> {
    tokio::time::timeout(timeout, probe.run(host, count, degrade))
        .await
        .unwrap_or(Err(ProbeError::Timeout {
            tool: "latency probe",
            timeout,
        }))
}
