//! Fixed-capacity experience replay.

use artificer_core::{FeatureInput, ObjectId, Outcome, Verb};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const PRIORITY_EPSILON: f32 = 1e-3;
const RECENCY_BOOST: f32 = 0.5;

/// One recorded interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub input: FeatureInput,
    pub outcome: Outcome,
    pub verb: Verb,
    pub tool: Option<ObjectId>,
    pub reward: f32,
    /// Sampling weight; only the newest item may be rewritten.
    pub priority: Option<f32>,
}

impl Transition {
    fn weight(&self, alpha: f32) -> f32 {
        let base = self.priority.unwrap_or(self.reward.abs()).max(0.0) + PRIORITY_EPSILON;
        let weight = base.powf(alpha);
        if weight.is_finite() { weight } else { 0.0 }
    }
}

/// Ring of past transitions with FIFO eviction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplayBuffer {
    capacity: usize,
    items: VecDeque<Transition>,
}

impl ReplayBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append a transition, evicting the oldest when full.
    pub fn push(&mut self, transition: Transition) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(transition);
    }

    /// Iterate transitions oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.items.iter()
    }

    /// The most recent `n` transitions in push order.
    #[must_use]
    pub fn sample_last(&self, n: usize) -> Vec<Transition> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }

    /// Weighted sampling without replacement.
    ///
    /// Each item weighs `(priority or |reward| + ε)^alpha`, scaled by up to 1.5× for the
    /// newest entries. Falls back to [`Self::sample_last`] when every weight is zero.
    pub fn sample_prioritized(
        &self,
        n: usize,
        alpha: f32,
        rng: &mut dyn RngCore,
    ) -> Vec<Transition> {
        let len = self.items.len();
        if len == 0 || n == 0 {
            return Vec::new();
        }
        let denom = (len.saturating_sub(1)).max(1) as f32;
        let mut weights: Vec<f32> = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| item.weight(alpha) * (1.0 + RECENCY_BOOST * idx as f32 / denom))
            .collect();
        let mut total: f32 = weights.iter().sum();
        if !(total > 0.0) {
            return self.sample_last(n);
        }

        let mut picked = Vec::with_capacity(n.min(len));
        while picked.len() < n && total > 0.0 {
            let mut needle = rng.random::<f32>() * total;
            let mut chosen = None;
            for (idx, weight) in weights.iter().enumerate() {
                if *weight <= 0.0 {
                    continue;
                }
                chosen = Some(idx);
                if needle < *weight {
                    break;
                }
                needle -= weight;
            }
            let Some(idx) = chosen else {
                break;
            };
            total -= weights[idx];
            weights[idx] = 0.0;
            picked.push(self.items[idx].clone());
        }
        picked
    }

    /// Overwrite the priority of the most recently pushed item.
    pub fn update_last_priority(&mut self, priority: f32) -> bool {
        match self.items.back_mut() {
            Some(item) => {
                item.priority = Some(if priority.is_finite() { priority.max(0.0) } else { 0.0 });
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
