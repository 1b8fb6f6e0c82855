//! Sampling-to-alert pipeline: sample buffer, anomaly scoring, SLO breach tracking.

pub mod anomaly;
pub mod breach;
pub mod buffer;
pub mod forest;
pub mod incident;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use self::anomaly::{AnomalyScorer, ScorerConfig};
pub use self::breach::{BreachConfig, BreachState, BreachStatus, BreachTracker};
pub use self::buffer::SampleBuffer;

/// Number of numeric features carried by a [`Sample`].
pub const FEATURE_COUNT: usize = 4;

/// Model input: `[p95_latency_seconds, jitter_ms, loss_pct, throughput_mbps]`.
pub type FeatureVector = [f64; FEATURE_COUNT];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectError {
    #[error("insufficient training data: need {needed} samples, have {have}")]
    InsufficientData { needed: usize, have: usize },

    #[error("degenerate training window: all {count} feature vectors are identical")]
    DegenerateWindow { count: usize },

    #[error("non-finite value in feature {feature} of training window")]
    NonFiniteFeature { feature: usize },
}

/// One probe cycle's measurement of the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub p95_latency_seconds: f64,
    pub jitter_ms: f64,
    pub loss_pct: f64,
    pub throughput_mbps: f64,
}

impl Sample {
    pub fn new(
        timestamp: DateTime<Utc>,
        p95_latency_seconds: f64,
        jitter_ms: f64,
        loss_pct: f64,
        throughput_mbps: f64,
    ) -> Self {
        Self {
            timestamp,
            p95_latency_seconds: p95_latency_seconds.max(0.0),
            jitter_ms: jitter_ms.max(0.0),
            loss_pct: loss_pct.clamp(0.0, 100.0),
            throughput_mbps: throughput_mbps.max(0.0),
        }
    }

    pub fn features(&self) -> FeatureVector {
        [
            self.p95_latency_seconds,
            self.jitter_ms,
            self.loss_pct,
            self.throughput_mbps,
        ]
    }
}

/// Why an alert was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    /// p95 latency stayed at or above the SLO threshold for the whole breach window.
    LocalSloBreach,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerReason::LocalSloBreach => write!(f, "local_slo_breach"),
        }
    }
}

/// Emitted once per qualifying breach episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub trigger_reason: TriggerReason,
    pub breach_count: usize,
}

/// Severity levels for recorded incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A recorded incident, as listed from storage.
#[derive(Debug, Serialize)]
pub struct Incident {
    pub id: Uuid,
    pub severity: Severity,
    pub verdict: String,
    pub evidence: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
