//! Isolation forest over fixed-width feature vectors.
//!
//! Each tree recursively partitions a random subsample of the training data by
//! picking a feature and a split value uniformly at random. Outliers end up in
//! shallow leaves, so a short mean path length across the forest means an
//! anomalous point. Scores follow Liu et al. (2008): `s = 2^(-E[h(x)] / c(psi))`.

use super::{DetectError, FeatureVector, FEATURE_COUNT};
use rand::Rng;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Per-tree subsample cap from Liu, Ting and Zhou (2008).
pub const MAX_SUBSAMPLE: usize = 256;

#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_samples: usize,
    /// Expected share of outliers; sets the decision threshold.
    pub contamination: f64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: MAX_SUBSAMPLE,
            contamination: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build<R: Rng + ?Sized>(
        data: &[FeatureVector],
        indices: Vec<usize>,
        height_limit: usize,
        rng: &mut R,
    ) -> Self {
        let mut nodes = Vec::new();
        grow(&mut nodes, data, indices, 0, height_limit, rng);
        Self { nodes }
    }

    fn path_length(&self, x: &FeatureVector) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[idx] {
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                } => {
                    idx = if x[feature] < value { left } else { right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(size),
            }
        }
    }
}

fn grow<R: Rng + ?Sized>(
    nodes: &mut Vec<Node>,
    data: &[FeatureVector],
    indices: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut R,
) -> usize {
    let id = nodes.len();
    nodes.push(Node::Leaf {
        size: indices.len(),
    });
    if indices.len() <= 1 || depth >= height_limit {
        return id;
    }

    // Only features that still vary inside this node can separate points.
    let splittable: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
        .filter_map(|feature| {
            let (lo, hi) = indices.iter().fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), &i| (lo.min(data[i][feature]), hi.max(data[i][feature])),
            );
            (hi > lo).then_some((feature, lo, hi))
        })
        .collect();
    if splittable.is_empty() {
        return id;
    }

    let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
    let value = lo + rng.gen::<f64>() * (hi - lo);
    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
        indices.into_iter().partition(|&i| data[i][feature] < value);

    let left = grow(nodes, data, left_idx, depth + 1, height_limit, rng);
    let right = grow(nodes, data, right_idx, depth + 1, height_limit, rng);
    nodes[id] = Node::Split {
        feature,
        value,
        left,
        right,
    };
    id
}

/// Average path length of an unsuccessful BST search over `n` points, `c(n)`.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A trained isolation forest.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample: usize,
    threshold: f64,
}

impl IsolationForest {
    /// Train on `data`. Fails on windows that cannot be partitioned at all.
    pub fn fit<R: Rng + ?Sized>(
        data: &[FeatureVector],
        config: &ForestConfig,
        rng: &mut R,
    ) -> Result<Self, DetectError> {
        if data.len() < 2 {
            return Err(DetectError::InsufficientData {
                needed: 2,
                have: data.len(),
            });
        }
        for row in data {
            if let Some(feature) = row.iter().position(|v| !v.is_finite()) {
                return Err(DetectError::NonFiniteFeature { feature });
            }
        }
        if data.iter().all(|row| row == &data[0]) {
            return Err(DetectError::DegenerateWindow { count: data.len() });
        }

        let subsample = config.max_samples.clamp(2, MAX_SUBSAMPLE).min(data.len());
        let height_limit = (subsample as f64).log2().ceil() as usize;

        let n_trees = config.n_trees.max(1);
        let mut trees = Vec::with_capacity(n_trees);
        for _ in 0..n_trees {
            let indices = rand::seq::index::sample(rng, data.len(), subsample).into_vec();
            trees.push(IsolationTree::build(data, indices, height_limit, rng));
        }

        let mut forest = Self {
            trees,
            subsample,
            threshold: 1.0,
        };

        let mut training: Vec<f64> = data.iter().map(|x| forest.score(x)).collect();
        training.sort_by(|a, b| a.total_cmp(b));
        let contamination = config.contamination.clamp(0.0, 0.5);
        forest.threshold = quantile(&training, 1.0 - contamination);

        Ok(forest)
    }

    /// Anomaly score in `(0, 1]`; larger is more anomalous, ~0.5 is unremarkable.
    pub fn score(&self, x: &FeatureVector) -> f64 {
        let mean_path = self.trees.iter().map(|t| t.path_length(x)).sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.subsample);
        if norm <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / norm)
    }

    /// Score above which a point counts as an outlier, derived from contamination.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_outlier(&self, score: f64) -> bool {
        score > self.threshold
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// Linear-interpolated quantile of an ascending slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
