//! Environment-driven configuration for the linkwatch daemon.
//!
//! Every knob has a compiled-in default and an environment variable override.
//! Malformed or out-of-range values are rejected at startup.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::{BreachConfig, ScorerConfig};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Effective configuration of one monitor process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub probe: ProbeSettings,
    pub detect: DetectSettings,
    pub alert: AlertSettings,
    pub paths: PathSettings,
}

/// Probe targets and cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSettings {
    pub target_host: String,
    pub iperf_host: String,
    pub ping_count: u32,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub iperf_seconds: u32,
    pub throughput_timeout_secs: u64,
    pub throughput_every_minutes: u64,
}

/// Sample retention and anomaly model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectSettings {
    pub buffer_capacity: usize,
    /// Scores at or above this are flagged anomalous in status and logs.
    pub anomaly_threshold: f64,
    pub scorer: ScorerConfig,
}

/// SLO breach detection and alert delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    pub latency_p95_ms: f64,
    pub breach_minutes: u64,
    pub min_breach_samples: usize,
    pub boundary_slack_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    pub tickets_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub log_path: PathBuf,
    pub degrade_flag_path: PathBuf,
}

impl MonitorConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let ping_count: u32 = env.parse("PING_COUNT", 10)?;
        at_least("PING_COUNT", ping_count, 1)?;
        let interval_secs: u64 = env.parse("PROBE_INTERVAL_SEC", 30)?;
        at_least("PROBE_INTERVAL_SEC", interval_secs, 1)?;
        let timeout_secs: u64 = env.parse("PROBE_TIMEOUT_SEC", u64::from(ping_count) + 10)?;
        at_least("PROBE_TIMEOUT_SEC", timeout_secs, 1)?;
        let iperf_seconds: u32 = env.parse("IPERF_SECONDS", 5)?;
        at_least("IPERF_SECONDS", iperf_seconds, 1)?;
        let throughput_timeout_secs: u64 =
            env.parse("THROUGHPUT_TIMEOUT_SEC", u64::from(iperf_seconds) + 15)?;
        at_least("THROUGHPUT_TIMEOUT_SEC", throughput_timeout_secs, 1)?;
        let throughput_every_minutes: u64 = env.parse("THROUGHPUT_EVERY_MINUTES", 5)?;
        at_least("THROUGHPUT_EVERY_MINUTES", throughput_every_minutes, 1)?;

        let probe = ProbeSettings {
            target_host: env.string("TARGET_HOST", "1.1.1.1"),
            iperf_host: env.string("IPERF_HOST", "iperf3"),
            ping_count,
            interval_secs,
            timeout_secs,
            iperf_seconds,
            throughput_timeout_secs,
            throughput_every_minutes,
        };

        let defaults = ScorerConfig::default();
        let buffer_capacity: usize = env.parse("BUFFER_CAPACITY", 2000)?;
        at_least("BUFFER_CAPACITY", buffer_capacity, 1)?;
        let window: usize = env.parse("ANOMALY_WINDOW", defaults.window)?;
        at_least("ANOMALY_WINDOW", window, 2)?;
        let min_train_size: usize = env.parse("ANOMALY_MIN_TRAIN", defaults.min_train_size)?;
        at_least("ANOMALY_MIN_TRAIN", min_train_size, 2)?;
        if min_train_size > window {
            return Err(ConfigError::Invalid {
                key: "ANOMALY_MIN_TRAIN",
                value: min_train_size.to_string(),
                reason: format!("must not exceed ANOMALY_WINDOW ({})", window),
            });
        }
        let anomaly_threshold: f64 = env.parse("ANOMALY_THRESHOLD", 0.65)?;
        in_range("ANOMALY_THRESHOLD", anomaly_threshold, 0.0, 1.0)?;
        let contamination: f64 = env.parse("ANOMALY_CONTAMINATION", defaults.contamination)?;
        in_range("ANOMALY_CONTAMINATION", contamination, 0.0, 0.5)?;
        let n_trees: usize = env.parse("ANOMALY_TREES", defaults.n_trees)?;
        at_least("ANOMALY_TREES", n_trees, 1)?;
        let random_seed: u64 = env.parse("ANOMALY_SEED", defaults.random_seed)?;
        let retrain_every: usize = env.parse("ANOMALY_RETRAIN_EVERY", defaults.retrain_every)?;
        at_least("ANOMALY_RETRAIN_EVERY", retrain_every, 1)?;

        let detect = DetectSettings {
            buffer_capacity,
            anomaly_threshold,
            scorer: ScorerConfig {
                window,
                min_train_size,
                contamination,
                n_trees,
                random_seed,
                retrain_every,
            },
        };

        let latency_p95_ms: f64 = env.parse("ALERT_LATENCY_P95_MS", 70.0)?;
        if !(latency_p95_ms.is_finite() && latency_p95_ms > 0.0) {
            return Err(ConfigError::Invalid {
                key: "ALERT_LATENCY_P95_MS",
                value: latency_p95_ms.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
        let breach_minutes: u64 = env.parse("ALERT_BREACH_MINUTES", 5)?;
        at_least("ALERT_BREACH_MINUTES", breach_minutes, 1)?;
        let min_breach_samples: usize =
            env.parse("ALERT_MIN_BREACH_SAMPLES", ping_count as usize)?;
        at_least("ALERT_MIN_BREACH_SAMPLES", min_breach_samples, 1)?;
        // Breaches must span at least half the window, whatever the slack.
        let max_slack_secs = breach_minutes.saturating_mul(60) / 2;
        let boundary_slack_secs: u64 =
            env.parse("ALERT_BOUNDARY_SLACK_SEC", interval_secs.min(max_slack_secs))?;
        if boundary_slack_secs > max_slack_secs {
            return Err(ConfigError::Invalid {
                key: "ALERT_BOUNDARY_SLACK_SEC",
                value: boundary_slack_secs.to_string(),
                reason: format!(
                    "must not exceed half the breach window ({}s)",
                    max_slack_secs
                ),
            });
        }
        let alert_timeout_secs: u64 = env.parse("ALERT_TIMEOUT_SEC", 3)?;
        at_least("ALERT_TIMEOUT_SEC", alert_timeout_secs, 1)?;

        let alert = AlertSettings {
            latency_p95_ms,
            breach_minutes,
            min_breach_samples,
            boundary_slack_secs,
            webhook_url: env.optional("ALERT_WEBHOOK_URL"),
            timeout_secs: alert_timeout_secs,
        };

        let paths = PathSettings {
            tickets_dir: env.string("TICKETS_DIR", "tickets").into(),
            reports_dir: env.string("REPORTS_DIR", "reports").into(),
            log_path: env.string("LOG_PATH", "app.log").into(),
            degrade_flag_path: env.string("DEGRADE_FLAG_PATH", ".degrade.flag").into(),
        };

        Ok(Self {
            probe,
            detect,
            alert,
            paths,
        })
    }

    pub fn scorer_config(&self) -> ScorerConfig {
        self.detect.scorer.clone()
    }

    pub fn breach_config(&self) -> BreachConfig {
        BreachConfig {
            threshold_seconds: self.alert.latency_p95_ms / 1000.0,
            window: Duration::from_secs(self.alert.breach_minutes.saturating_mul(60)),
            min_breach_samples: self.alert.min_breach_samples,
            boundary_slack: Duration::from_secs(self.alert.boundary_slack_secs),
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.timeout_secs)
    }

    pub fn throughput_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.throughput_timeout_secs)
    }

    pub fn alert_timeout(&self) -> Duration {
        Duration::from_secs(self.alert.timeout_secs)
    }

    /// Create the ticket and report directories, and the log file's parent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.paths.tickets_dir)?;
        std::fs::create_dir_all(&self.paths.reports_dir)?;
        if let Some(parent) = self.paths.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

fn at_least<T>(key: &'static str, value: T, min: T) -> Result<(), ConfigError>
where
    T: PartialOrd + Display,
{
    if value < min {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: format!("must be at least {}", min),
        });
    }
    Ok(())
}

/// Exclusive lower bound, inclusive upper bound.
fn in_range(key: &'static str, value: f64, low: f64, high: f64) -> Result<(), ConfigError> {
    if !(value > low && value <= high) {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: format!("must be in ({}, {}]", low, high),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<MonitorConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.probe.target_host, "1.1.1.1");
        assert_eq!(cfg.probe.iperf_host, "iperf3");
        assert_eq!(cfg.probe.ping_count, 10);
        assert_eq!(cfg.probe.interval_secs, 30);
        assert_eq!(cfg.probe.timeout_secs, 20);
        assert_eq!(cfg.probe.throughput_timeout_secs, 20);
        assert_eq!(cfg.probe.throughput_every_minutes, 5);
        assert_eq!(cfg.detect.buffer_capacity, 2000);
        assert_eq!(cfg.detect.scorer, ScorerConfig::default());
        assert_eq!(cfg.alert.webhook_url, None);
        assert_eq!(cfg.paths.log_path, PathBuf::from("app.log"));

        let breach = cfg.breach_config();
        assert!((breach.threshold_seconds - 0.070).abs() < 1e-12);
        assert_eq!(breach.window, Duration::from_secs(300));
        assert_eq!(breach.min_breach_samples, 10);
    }

    #[test]
    fn test_derived_defaults_follow_their_source() {
        let cfg = from_pairs(&[
            ("PING_COUNT", "4"),
            ("PROBE_INTERVAL_SEC", "15"),
            ("IPERF_SECONDS", "10"),
        ])
        .unwrap();
        assert_eq!(cfg.alert.min_breach_samples, 4);
        assert_eq!(cfg.alert.boundary_slack_secs, 15);
        assert_eq!(cfg.probe.timeout_secs, 14);
        assert_eq!(cfg.probe.throughput_timeout_secs, 25);
    }

    #[test]
    fn test_explicit_overrides() {
        let cfg = from_pairs(&[
            ("TARGET_HOST", " 9.9.9.9 "),
            ("ALERT_MIN_BREACH_SAMPLES", "3"),
            ("ALERT_BOUNDARY_SLACK_SEC", "0"),
            ("ALERT_WEBHOOK_URL", "http://hooks.local/alert"),
            ("ANOMALY_RETRAIN_EVERY", "10"),
        ])
        .unwrap();
        assert_eq!(cfg.probe.target_host, "9.9.9.9");
        assert_eq!(cfg.alert.min_breach_samples, 3);
        assert_eq!(cfg.breach_config().boundary_slack, Duration::ZERO);
        assert_eq!(cfg.alert.webhook_url.as_deref(), Some("http://hooks.local/alert"));
        assert_eq!(cfg.scorer_config().retrain_every, 10);
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let err = from_pairs(&[("PING_COUNT", "ten")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PING_COUNT", .. }));
        assert!(err.to_string().contains("PING_COUNT"));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert!(from_pairs(&[("PROBE_INTERVAL_SEC", "0")]).is_err());
        assert!(from_pairs(&[("ANOMALY_CONTAMINATION", "0.9")]).is_err());
        assert!(from_pairs(&[("ALERT_LATENCY_P95_MS", "-5")]).is_err());
        assert!(from_pairs(&[("ANOMALY_WINDOW", "20"), ("ANOMALY_MIN_TRAIN", "30")]).is_err());
    }

    #[test]
    fn test_boundary_slack_is_bounded_by_breach_window() {
        let err = from_pairs(&[("ALERT_BOUNDARY_SLACK_SEC", "600")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ALERT_BOUNDARY_SLACK_SEC", .. }));
        assert!(from_pairs(&[("ALERT_BOUNDARY_SLACK_SEC", "151")]).is_err());
        assert!(from_pairs(&[
            ("ALERT_BREACH_MINUTES", "10"),
            ("ALERT_BOUNDARY_SLACK_SEC", "300"),
        ])
        .is_ok());
    }

    #[test]
    fn test_derived_slack_is_clamped_for_long_intervals() {
        let cfg = from_pairs(&[("PROBE_INTERVAL_SEC", "300")]).unwrap();
        assert_eq!(cfg.alert.boundary_slack_secs, 150);

        // A 45 second burst at the end of the window must not qualify.
        let mut tracker = crate::detect::BreachTracker::new(cfg.breach_config());
        let t0 = chrono::Utc::now();
        let fired = (0..10)
            .filter(|i| {
                tracker
                    .observe(t0 + chrono::Duration::seconds(i * 5), 0.200)
                    .is_some()
            })
            .count();
        assert_eq!(fired, 0);
    }

    #[test]
    fn test_blank_value_falls_back_to_default() {
        let cfg = from_pairs(&[("PING_COUNT", "  ")]).unwrap();
        assert_eq!(cfg.probe.ping_count, 10);
    }

    #[test]
    fn test_toml_round_trip() {
        let cfg = from_pairs(&[]).unwrap();
        let rendered = cfg.to_toml().unwrap();
        assert!(rendered.contains("[probe]"));
        assert!(rendered.contains("target_host = \"1.1.1.1\""));
        let parsed: MonitorConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let cfg = MonitorConfig::from_lookup(|key| match key {
            "TICKETS_DIR" => Some(format!("{}/t", base)),
            "REPORTS_DIR" => Some(format!("{}/r", base)),
            "LOG_PATH" => Some(format!("{}/logs/app.log", base)),
            _ => None,
        })
        .unwrap();
        cfg.ensure_dirs().unwrap();
        assert!(dir.path().join("t").is_dir());
        assert!(dir.path().join("r").is_dir());
        assert!(dir.path().join("logs").is_dir());
    }
}
