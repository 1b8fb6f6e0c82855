//! SLO breach tracking with debounce.
//!
//! ```text
//!   Normal --breach--> Accumulating --qualifying window--> Triggered --emit + clear--> Normal
//!                           |
//!                           +--window drains empty--> Normal
//! ```
//!
//! A window qualifies when it holds at least `min_breach_samples` breaches and
//! its oldest breach sits at (or within `boundary_slack` after) the trailing
//! cutoff, i.e. breaches span the whole window rather than a burst at its end.
//!
//! `Triggered` is transient: it is entered and left within the `observe` call
//! that emits the alert, so [`BreachTracker::status`] only ever reports
//! `Normal` or `Accumulating`. Completed episodes show up in `episodes` and
//! `last_triggered_at` instead.

use super::{AlertEvent, Sample, TriggerReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct BreachConfig {
    /// p95 latency at or above this value is a breach.
    pub threshold_seconds: f64,
    /// Trailing window breaches must span before an alert fires.
    pub window: Duration,
    pub min_breach_samples: usize,
    /// Tolerance for the oldest breach landing after the cutoff boundary.
    pub boundary_slack: Duration,
}

impl Default for BreachConfig {
    fn default() -> Self {
        Self {
            threshold_seconds: 0.070,
            window: Duration::from_secs(5 * 60),
            min_breach_samples: 10,
            boundary_slack: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachState {
    Normal,
    Accumulating,
    /// Only held while an alert is being emitted; never observable from outside.
    Triggered,
}

/// Point-in-time view for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreachStatus {
    pub state: BreachState,
    pub accumulated: usize,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub episodes: u64,
    pub threshold_seconds: f64,
}

#[derive(Debug)]
pub struct BreachTracker {
    config: BreachConfig,
    window: VecDeque<DateTime<Utc>>,
    state: BreachState,
    last_triggered_at: Option<DateTime<Utc>>,
    episodes: u64,
}

impl BreachTracker {
    pub fn new(config: BreachConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            state: BreachState::Normal,
            last_triggered_at: None,
            episodes: 0,
        }
    }

    /// Feed one sample; returns an event when this sample completes a breach episode.
    pub fn update(&mut self, sample: &Sample) -> Option<AlertEvent> {
        self.observe(sample.timestamp, sample.p95_latency_seconds)
    }

    pub fn observe(&mut self, now: DateTime<Utc>, p95_latency_seconds: f64) -> Option<AlertEvent> {
        if p95_latency_seconds >= self.config.threshold_seconds {
            self.window.push_back(now);
            if self.state == BreachState::Normal {
                self.transition(BreachState::Accumulating);
            }
        }

        let cutoff = now - to_chrono(self.config.window);
        self.window.retain(|t| *t >= cutoff);

        if self.state != BreachState::Accumulating {
            return None;
        }

        let Some(&oldest) = self.window.front() else {
            self.transition(BreachState::Normal);
            return None;
        };

        let spans_window = oldest <= cutoff + to_chrono(self.config.boundary_slack);
        if !spans_window || self.window.len() < self.config.min_breach_samples {
            return None;
        }

        self.transition(BreachState::Triggered);
        let event = AlertEvent {
            id: Uuid::new_v4(),
            window_start: oldest,
            window_end: now,
            trigger_reason: TriggerReason::LocalSloBreach,
            breach_count: self.window.len(),
        };
        info!(
            id = %event.id,
            breaches = event.breach_count,
            from = %event.window_start,
            to = %event.window_end,
            threshold_s = self.config.threshold_seconds,
            "SLO breach sustained, raising alert"
        );

        self.window.clear();
        self.last_triggered_at = Some(now);
        self.episodes += 1;
        self.transition(BreachState::Normal);
        Some(event)
    }

    fn transition(&mut self, to: BreachState) {
        debug!(from = ?self.state, ?to, accumulated = self.window.len(), "Breach state transition");
        self.state = to;
    }

    pub fn state(&self) -> BreachState {
        self.state
    }

    pub fn accumulated(&self) -> usize {
        self.window.len()
    }

    pub fn last_triggered_at(&self) -> Option<DateTime<Utc>> {
        self.last_triggered_at
    }

    pub fn status(&self) -> BreachStatus {
        BreachStatus {
            state: self.state,
            accumulated: self.window.len(),
            last_triggered_at: self.last_triggered_at,
            episodes: self.episodes,
            threshold_seconds: self.config.threshold_seconds,
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::weeks(52))
}
