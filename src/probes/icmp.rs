use super::{LatencyProbe, LatencyReport, ProbeError};
use tokio::process::Command;
use tracing::{debug, warn};

/// ICMP probe wrapper around the system `ping` binary.
/// Future: Use `socket2` for raw sockets to avoid fork/exec overhead.
pub struct PingProbe {
    binary: String,
}

impl Default for PingProbe {
    fn default() -> Self {
        Self {
            binary: "ping".to_string(),
        }
    }
}

impl PingProbe {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait::async_trait]
impl LatencyProbe for PingProbe {
    async fn run(&self, host: &str, count: u32, degrade: bool) -> Result<LatencyReport, ProbeError> {
        // -c N: N echo requests, one second apart
        let output = Command::new(&self.binary)
            .arg("-c")
            .arg(count.max(1).to_string())
            .arg(host)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn { tool: "ping", source })?;

        // Non-zero exit still carries a loss summary when replies were lost.
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(ProbeError::NoOutput {
                tool: "ping",
                code: output.status.code(),
            });
        }
        if !output.status.success() {
            warn!(%host, code = ?output.status.code(), "ping exited non-zero");
        }

        let report = parse_ping_output(&stdout);
        debug!(%host, replies = report.sample_count, p95_s = report.p95_latency_seconds, "ping parsed");
        Ok(if degrade { report.degraded() } else { report })
    }
}

/// Extract p95 RTT, jitter and loss from `ping` output.
pub fn parse_ping_output(output: &str) -> LatencyReport {
    let rtts = extract_rtts(output);
    let loss_pct = extract_loss(output).unwrap_or(0.0);

    LatencyReport {
        p95_latency_seconds: p95_ms(&rtts) / 1000.0,
        jitter_ms: population_std_dev(&rtts),
        loss_pct,
        sample_count: rtts.len(),
    }
}

/// Every `time=12.3` value, in ms.
fn extract_rtts(output: &str) -> Vec<f64> {
    output
        .split("time=")
        .skip(1)
        .filter_map(|rest| {
            let end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .unwrap_or(rest.len());
            rest[..end].parse::<f64>().ok()
        })
        .collect()
}

/// The `N% packet loss` figure from the summary line.
fn extract_loss(output: &str) -> Option<f64> {
    let pos = output.find("% packet loss")?;
    let head = &output[..pos];
    let start = head
        .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|i| i + 1)
        .unwrap_or(0);
    head[start..].parse::<f64>().ok()
}

/// p95 as `sorted[floor(0.95 * n) - 1]`; for fewer than two replies that
/// index underflows and the largest RTT is used.
fn p95_ms(rtts: &[f64]) -> f64 {
    if rtts.is_empty() {
        return 0.0;
    }
    let mut sorted = rtts.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (0.95 * sorted.len() as f64) as usize;
    let idx = rank.checked_sub(1).unwrap_or(sorted.len() - 1);
    sorted[idx]
}

fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_PING: &str = "\
PING 1.1.1.1 (1.1.1.1) 56(84) bytes of data.
64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=11.2 ms
64 bytes from 1.1.1.1: icmp_seq=2 ttl=57 time=12.8 ms
64 bytes from 1.1.1.1: icmp_seq=3 ttl=57 time=10.9 ms
64 bytes from 1.1.1.1: icmp_seq=4 ttl=57 time=35.0 ms
64 bytes from 1.1.1.1: icmp_seq=5 ttl=57 time=11.1 ms
64 bytes from 1.1.1.1: icmp_seq=6 ttl=57 time=11.6 ms
64 bytes from 1.1.1.1: icmp_seq=7 ttl=57 time=12.0 ms
64 bytes from 1.1.1.1: icmp_seq=8 ttl=57 time=11.4 ms
64 bytes from 1.1.1.1: icmp_seq=10 ttl=57 time=11.0 ms

--- 1.1.1.1 ping statistics ---
10 packets transmitted, 9 received, 10% packet loss, time 9013ms
rtt min/avg/max/mdev = 10.900/14.111/35.000/7.560 ms
";

    #[test]
    fn test_parse_linux_ping() {
        let r = parse_ping_output(LINUX_PING);
        assert_eq!(r.sample_count, 9);
        assert_eq!(r.loss_pct, 10.0);
        // floor(0.95 * 9) - 1 = 7 -> second largest of the sorted RTTs
        assert!((r.p95_latency_seconds - 0.0128).abs() < 1e-9);
        assert!(r.jitter_ms > 7.0 && r.jitter_ms < 8.0, "jitter {}", r.jitter_ms);
    }

    #[test]
    fn test_parse_total_loss() {
        let out = "PING 10.255.255.1 (10.255.255.1) 56(84) bytes of data.\n\n\
                   --- 10.255.255.1 ping statistics ---\n\
                   10 packets transmitted, 0 received, 100% packet loss, time 9201ms\n";
        let r = parse_ping_output(out);
        assert_eq!(r.sample_count, 0);
        assert_eq!(r.loss_pct, 100.0);
        assert_eq!(r.p95_latency_seconds, 0.0);
        assert_eq!(r.jitter_ms, 0.0);
    }

    #[test]
    fn test_parse_bsd_loss_format() {
        let out = "64 bytes from 1.1.1.1: icmp_seq=0 ttl=57 time=9.871 ms\n\
                   1 packets transmitted, 1 packets received, 0.0% packet loss\n";
        let r = parse_ping_output(out);
        assert_eq!(r.sample_count, 1);
        assert_eq!(r.loss_pct, 0.0);
        assert!((r.p95_latency_seconds - 0.009871).abs() < 1e-12);
    }

    #[test]
    fn test_p95_single_reply_uses_max() {
        assert_eq!(p95_ms(&[42.0]), 42.0);
        assert_eq!(p95_ms(&[]), 0.0);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let probe = PingProbe::with_binary("/nonexistent/ping-binary");
        let err = probe.run("127.0.0.1", 1, false).await.unwrap_err();
        assert!(matches!(err, ProbeError::Spawn { .. }));
    }

    #[tokio::test]
    #[ignore] // Requires ping and loopback ICMP permissions
    async fn test_live_ping_loopback() {
        let r = PingProbe::default().run("127.0.0.1", 3, false).await.unwrap();
        assert_eq!(r.sample_count, 3);
        assert_eq!(r.loss_pct, 0.0);
    }
}
