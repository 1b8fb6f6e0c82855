//! Throughput measurement via iperf3.

pub mod iperf;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use self::iperf::Iperf3Probe;

#[derive(Debug, Error)]
pub enum ThroughputError {
    #[error("iperf3 not found at {path}")]
    Iperf3NotFound { path: String },

    #[error("iperf3 process exited with code {code}: {stderr}")]
    Iperf3Failed { code: i32, stderr: String },

    #[error("iperf3 output could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to run iperf3: {0}")]
    Io(#[from] std::io::Error),

    #[error("throughput test timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputReport {
    pub throughput_mbps: f64,
}

/// Measures achievable throughput to a host. Heavy; run on a coarse cadence.
#[async_trait::async_trait]
pub trait ThroughputProbe: Send + Sync {
    async fn run(&self, host: &str) -> Result<ThroughputReport, ThroughputError>;
}

/// Run `probe`, converting a timeout into [`ThroughputError::Timeout`].
pub async fn run_throughput_bounded(
    probe: &dyn ThroughputProbe,
    host: &str,
    timeout: Duration,
) -> Result<ThroughputReport, ThroughputError> {
    tokio::time::timeout(timeout, probe.run(host))
        .await
        .unwrap_or(Err(ThroughputError::Timeout(timeout)))
}

/// Format a throughput figure for humans.
pub fn format_mbps(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}
