//! Fixed-capacity price history and the statistics derived from it

use crate::data::{PriceObservation, Statistics};
use std::collections::VecDeque;

/// Default number of observations retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Sliding window of the most recent observations, oldest first
///
/// Appending at capacity evicts the oldest observation.
#[derive(Debug, Clone)]
pub struct SlidingHistory {
    observations: VecDeque<PriceObservation>,
    capacity: usize,
}

impl SlidingHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// A zero capacity is bumped to one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            observations: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, observation: PriceObservation) {
        if self.observations.len() >= self.capacity {
            self.observations.pop_front();
        }
        self.observations.push_back(observation);
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PriceObservation> {
        self.observations.back()
    }

    pub fn first(&self) -> Option<&PriceObservation> {
        self.observations.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceObservation> {
        self.observations.iter()
    }

    /// Owned copy in insertion order
    pub fn to_vec(&self) -> Vec<PriceObservation> {
        self.observations.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.observations.clear();
    }

    /// High, low, percent change and count over the window
    ///
    /// Returns `None` below two observations. The percent change is measured
    /// against the oldest *retained* observation, so it drifts as the window
    /// slides; it is not a since-open figure. A non-positive reference price
    /// yields 0%.
    pub fn statistics(&self) -> Option<Statistics> {
        if self.observations.len() < 2 {
            return None;
        }

        let (first, latest) = (self.first()?.price, self.latest()?.price);
        let (high, low) = self
            .observations
            .iter()
            .fold((f64::MIN, f64::MAX), |(hi, lo), o| (hi.max(o.price), lo.min(o.price)));

        let change_percent = if first > 0.0 {
            (latest - first) / first * 100.0
        } else {
            0.0
        };

        Some(Statistics {
            high,
            low,
            change_percent,
            count: self.observations.len(),
        })
    }
}

impl Default for SlidingHistory {
    fn default() -> Self {
        Self::new()
    }
}
