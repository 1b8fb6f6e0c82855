use crate::detect::forest::{ForestConfig, IsolationForest};
use crate::detect::{DetectError, FeatureVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Number of most recent feature vectors the model is trained on.
    pub window: usize,
    /// Below this many vectors the scorer is warming up and returns 0.0.
    pub min_train_size: usize,
    pub contamination: f64,
    pub n_trees: usize,
    pub random_seed: u64,
    /// Retrain after this many new vectors; 1 retrains on every sample.
    pub retrain_every: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            window: 120,
            min_train_size: 30,
            contamination: 0.05,
            n_trees: 100,
            random_seed: 42,
            retrain_every: 1,
        }
    }
}

/// Sliding-window isolation-forest scorer.
///
/// Training cost grows with the window size and is paid every
/// `retrain_every` samples. Between retrains the newest vector is scored
/// against the last trained forest.
#[derive(Debug)]
pub struct AnomalyScorer {
    config: ScorerConfig,
    forest_config: ForestConfig,
    window: VecDeque<FeatureVector>,
    model: Option<IsolationForest>,
    rng: StdRng,
    latest_score: f64,
    ready: bool,
    since_train: usize,
    models_trained: u64,
    training_failures: u64,
    last_error: Option<DetectError>,
}

impl AnomalyScorer {
    pub fn new(config: ScorerConfig) -> Self {
        let mut config = config;
        config.window = config.window.max(2);
        config.min_train_size = config.min_train_size.clamp(2, config.window);
        config.retrain_every = config.retrain_every.max(1);

        let forest_config = ForestConfig {
            n_trees: config.n_trees.max(1),
            contamination: config.contamination,
            ..ForestConfig::default()
        };

        Self {
            rng: StdRng::seed_from_u64(config.random_seed),
            window: VecDeque::with_capacity(config.window),
            forest_config,
            config,
            model: None,
            latest_score: 0.0,
            ready: false,
            since_train: 0,
            models_trained: 0,
            training_failures: 0,
            last_error: None,
        }
    }

    /// Push `features` into the window and score it against the window.
    ///
    /// Returns 0.0 while warming up. When training fails the previous score is
    /// returned unchanged and the failure is logged and counted.
    pub fn add(&mut self, features: FeatureVector) -> f64 {
        while self.window.len() >= self.config.window {
            self.window.pop_front();
        }
        self.window.push_back(features);

        if self.window.len() < self.config.min_train_size {
            return 0.0;
        }
        self.ready = true;

        self.since_train += 1;
        if self.model.is_none() || self.since_train >= self.config.retrain_every {
            if let Err(e) = self.retrain() {
                self.training_failures += 1;
                warn!(
                    error = %e,
                    window = self.window.len(),
                    fallback = self.latest_score,
                    "Anomaly model training failed, keeping last score"
                );
                self.last_error = Some(e);
                return self.latest_score;
            }
        }

        let Some(model) = self.model.as_ref() else {
            return self.latest_score;
        };
        self.latest_score = model.score(&features);
        self.last_error = None;
        self.latest_score
    }

    fn retrain(&mut self) -> Result<(), DetectError> {
        let data: Vec<FeatureVector> = self.window.iter().copied().collect();
        let model = IsolationForest::fit(&data, &self.forest_config, &mut self.rng)?;
        debug!(
            window = data.len(),
            trees = model.n_trees(),
            threshold = model.threshold(),
            "Anomaly model retrained"
        );
        self.model = Some(model);
        self.since_train = 0;
        self.models_trained += 1;
        Ok(())
    }

    pub fn latest_score(&self) -> f64 {
        self.latest_score
    }

    /// True once the window has reached `min_train_size`; never reverts.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Binary classification against the contamination-derived threshold.
    pub fn is_outlier(&self, score: f64) -> bool {
        self.model.as_ref().is_some_and(|m| m.is_outlier(score))
    }

    pub fn threshold(&self) -> Option<f64> {
        self.model.as_ref().map(|m| m.threshold())
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn models_trained(&self) -> u64 {
        self.models_trained
    }

    pub fn training_failures(&self) -> u64 {
        self.training_failures
    }

    pub fn last_error(&self) -> Option<&DetectError> {
        self.last_error.as_ref()
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(i: usize) -> FeatureVector {
        let w = (i % 9) as f64;
        [0.020 + w * 0.002, 1.0 + w * 0.3, (i % 3) as f64 * 0.5, 400.0 + w * 5.0]
    }

    fn small_config() -> ScorerConfig {
        ScorerConfig {
            n_trees: 25,
            ..ScorerConfig::default()
        }
    }

    #[test]
    fn test_warm_up_returns_zero() {
        let mut scorer = AnomalyScorer::new(small_config());
        for i in 0..29 {
            assert_eq!(scorer.add(vector(i)), 0.0);
            assert!(!scorer.is_ready());
        }
        assert_eq!(scorer.models_trained(), 0);
    }

    #[test]
    fn test_ready_is_monotonic() {
        let mut scorer = AnomalyScorer::new(small_config());
        for i in 0..30 {
            scorer.add(vector(i));
        }
        assert!(scorer.is_ready());
        assert!(scorer.latest_score() > 0.0);

        for i in 30..200 {
            scorer.add(vector(i));
            assert!(scorer.is_ready());
        }
        assert_eq!(scorer.window_len(), 120);
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let run = || {
            let mut scorer = AnomalyScorer::new(small_config());
            (0..80).map(|i| scorer.add(vector(i))).collect::<Vec<f64>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_spike_scores_above_baseline() {
        let mut scorer = AnomalyScorer::new(small_config());
        let mut baseline = 0.0;
        for i in 0..60 {
            baseline = scorer.add(vector(i));
        }
        let spike = scorer.add([0.300, 45.0, 25.0, 3.0]);
        assert!(spike > baseline, "spike {} <= baseline {}", spike, baseline);
        assert!(scorer.is_outlier(spike));
    }

    #[test]
    fn test_degenerate_window_falls_back() {
        let config = ScorerConfig {
            window: 30,
            ..small_config()
        };
        let mut scorer = AnomalyScorer::new(config);
        let flat = [0.02, 1.0, 0.0, 0.0];

        for _ in 0..29 {
            scorer.add(flat);
        }
        // First trainable window is a single repeated vector.
        assert_eq!(scorer.add(flat), 0.0);
        assert!(scorer.is_ready());
        assert_eq!(scorer.training_failures(), 1);
        assert!(matches!(
            scorer.last_error(),
            Some(DetectError::DegenerateWindow { .. })
        ));

        let odd = scorer.add([0.2, 9.0, 4.0, 50.0]);
        assert!(odd > 0.0);
        assert!(scorer.last_error().is_none());

        // Flush the odd vector back out of the window.
        let mut previous = odd;
        for _ in 0..29 {
            previous = scorer.add(flat);
        }
        let fallback = scorer.add(flat);
        assert_eq!(fallback, previous);
        assert_eq!(scorer.training_failures(), 2);
    }

    #[test]
    fn test_retrain_cadence() {
        let config = ScorerConfig {
            retrain_every: 10,
            ..small_config()
        };
        let mut scorer = AnomalyScorer::new(config);
        for i in 0..30 {
            scorer.add(vector(i));
        }
        assert_eq!(scorer.models_trained(), 1);

        for i in 30..50 {
            scorer.add(vector(i));
        }
        assert_eq!(scorer.models_trained(), 3);
    }

    #[test]
    fn test_min_train_clamped_to_window() {
        let config = ScorerConfig {
            window: 10,
            min_train_size: 50,
            ..small_config()
        };
        let scorer = AnomalyScorer::new(config);
        assert_eq!(scorer.config().min_train_size, 10);
    }
}
