//! Shared monitor state: the sample buffer, anomaly scorer and breach tracker.
//!
//! The scheduler writes through [`Monitor::ingest`]; HTTP handlers read.
//! All three components sit behind one lock so a reader never sees a sample
//! in the buffer that the scorer or tracker has not processed yet.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::detect::{
    AlertEvent, AnomalyScorer, BreachConfig, BreachStatus, BreachTracker, Sample, SampleBuffer,
    ScorerConfig,
};

pub struct MonitorState {
    pub buffer: SampleBuffer,
    pub scorer: AnomalyScorer,
    pub breach: BreachTracker,
}

/// Outcome of feeding one sample through the pipeline.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub score: f64,
    pub ready: bool,
    pub outlier: bool,
    pub alert: Option<AlertEvent>,
    /// Set when this sample's model retrain failed.
    pub scorer_failed: bool,
}

/// Point-in-time view served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub latest_sample: Option<Sample>,
    pub anomaly_score: f64,
    pub anomaly_ready: bool,
    pub anomaly_threshold: Option<f64>,
    pub models_trained: u64,
    pub training_failures: u64,
    pub buffered_samples: usize,
    pub breach: BreachStatus,
}

pub struct Monitor {
    inner: RwLock<MonitorState>,
}

impl Monitor {
    pub fn new(buffer_capacity: usize, scorer: ScorerConfig, breach: BreachConfig) -> Self {
        Self {
            inner: RwLock::new(MonitorState {
                buffer: SampleBuffer::new(buffer_capacity),
                scorer: AnomalyScorer::new(scorer),
                breach: BreachTracker::new(breach),
            }),
        }
    }

    /// Append, score and breach-check `sample` under a single write lock.
    pub async fn ingest(&self, sample: Sample) -> Ingested {
        let mut state = self.inner.write().await;
        let failures_before = state.scorer.training_failures();

        state.buffer.append(sample.clone());
        let score = state.scorer.add(sample.features());
        let alert = state.breach.update(&sample);

        Ingested {
            score,
            ready: state.scorer.is_ready(),
            outlier: state.scorer.is_outlier(score),
            alert,
            scorer_failed: state.scorer.training_failures() > failures_before,
        }
    }

    pub async fn latest_score(&self) -> f64 {
        self.inner.read().await.scorer.latest_score()
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.read().await.scorer.is_ready()
    }

    pub async fn latest_sample(&self) -> Option<Sample> {
        self.inner.read().await.buffer.latest().cloned()
    }

    pub async fn snapshot(&self, since: DateTime<Utc>) -> Vec<Sample> {
        self.inner.read().await.buffer.snapshot(since)
    }

    pub async fn breach_status(&self) -> BreachStatus {
        self.inner.read().await.breach.status()
    }

    pub async fn status(&self) -> MonitorStatus {
        let state = self.inner.read().await;
        MonitorStatus {
            latest_sample: state.buffer.latest().cloned(),
            anomaly_score: state.scorer.latest_score(),
            anomaly_ready: state.scorer.is_ready(),
            anomaly_threshold: state.scorer.threshold(),
            models_trained: state.scorer.models_trained(),
            training_failures: state.scorer.training_failures(),
            buffered_samples: state.buffer.len(),
            breach: state.breach.status(),
        }
    }
}
