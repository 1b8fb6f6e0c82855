//! iperf3 process wrapper -- spawn, parse JSON output.

use super::{ThroughputError, ThroughputProbe, ThroughputReport};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// Parsed iperf3 JSON result (subset of fields we care about).
#[derive(Debug, Deserialize)]
pub struct Iperf3Result {
    pub end: Iperf3End,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3End {
    pub sum_received: Iperf3Sum,
}

#[derive(Debug, Deserialize)]
pub struct Iperf3Sum {
    pub bits_per_second: f64,
    #[serde(default)]
    pub bytes: u64,
}

/// Parse an iperf3 JSON output string into a structured result.
pub fn parse_output(json_str: &str) -> Result<Iperf3Result, ThroughputError> {
    let result: Iperf3Result = serde_json::from_str(json_str)?;
    Ok(result)
}

/// Runs `iperf3 -c <host> -J -t <seconds>` and reports received Mbps.
pub struct Iperf3Probe {
    binary: String,
    seconds: u32,
}

impl Iperf3Probe {
    pub fn new(seconds: u32) -> Self {
        Self {
            binary: "iperf3".to_string(),
            seconds: seconds.max(1),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait::async_trait]
impl ThroughputProbe for Iperf3Probe {
    async fn run(&self, host: &str) -> Result<ThroughputReport, ThroughputError> {
        let output = Command::new(&self.binary)
            .args(["-c", host, "-J", "-t"])
            .arg(self.seconds.to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ThroughputError::Iperf3NotFound {
                    path: self.binary.clone(),
                },
                _ => ThroughputError::Io(e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        // iperf3 -J reports errors as JSON too; a failed run has no `end.sum_received`.
        let parsed = parse_output(&stdout).map_err(|e| match output.status.code() {
            Some(code) if code != 0 => ThroughputError::Iperf3Failed {
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
            _ => e,
        })?;

        let throughput_mbps = parsed.end.sum_received.bits_per_second / 1e6;
        debug!(%host, throughput_mbps, bytes = parsed.end.sum_received.bytes, "iperf3 finished");
        Ok(ThroughputReport { throughput_mbps })
    }
}
