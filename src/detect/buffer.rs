use super::Sample;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Default number of samples retained (about 16 hours at a 30s cadence).
pub const DEFAULT_CAPACITY: usize = 2000;

/// Bounded, time-ordered store of probe samples.
///
/// Insertion order is time order. Once `capacity` is reached every append
/// evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, sample: Sample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// All samples with `timestamp >= cutoff`, in insertion order.
    pub fn range_since(&self, cutoff: DateTime<Utc>) -> Vec<Sample> {
        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Copy of the samples since `since`, for report and status consumers.
    pub fn snapshot(&self, since: DateTime<Utc>) -> Vec<Sample> {
        self.range_since(since)
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}
