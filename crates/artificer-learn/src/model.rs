//! Online linear outcome model with visitation-count novelty.

use artificer_core::{FEATURE_SIZE, FeatureInput, OUTCOME_SIZE, Outcome, pairs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const BUCKETS: f32 = 4.0;

fn bucket(value: f32) -> u8 {
    ((value.clamp(0.0, 1.0) * BUCKETS) as u8).min(BUCKETS as u8 - 1)
}

/// Discretised input used for visitation counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoveltyKey {
    pub verb_slot: Option<u8>,
    pub tool_mass: u8,
    pub target_mass: u8,
    pub geometry: u8,
}

impl NoveltyKey {
    #[must_use]
    pub fn quantize(input: &FeatureInput) -> Self {
        Self {
            verb_slot: input.verb_slot().map(|slot| slot as u8),
            tool_mass: bucket(input.tool_mass()),
            target_mass: bucket(input.target_mass()),
            geometry: bucket(input.geometry()),
        }
    }
}

/// One linear row per outcome coordinate, ReLU-clamped on output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeModel {
    weights: [[f32; FEATURE_SIZE]; OUTCOME_SIZE],
    bias: [f32; OUTCOME_SIZE],
    #[serde(with = "pairs")]
    visits: BTreeMap<NoveltyKey, u32>,
    frozen: bool,
    mean_error: f32,
    samples: u64,
}

impl Default for OutcomeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeModel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            weights: [[0.0; FEATURE_SIZE]; OUTCOME_SIZE],
            bias: [0.0; OUTCOME_SIZE],
            visits: BTreeMap::new(),
            frozen: false,
            mean_error: 0.0,
            samples: 0,
        }
    }

    #[must_use]
    pub fn predict(&self, input: &FeatureInput) -> Outcome {
        let x = input.values();
        let mut out = self.bias;
        for (row, acc) in self.weights.iter().zip(out.iter_mut()) {
            *acc += row.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f32>();
        }
        Outcome::from_array(out)
    }

    /// `1 / sqrt(visits + 1)` for the input's quantised key.
    #[must_use]
    pub fn novelty(&self, input: &FeatureInput) -> f32 {
        let visits = self
            .visits
            .get(&NoveltyKey::quantize(input))
            .copied()
            .unwrap_or(0);
        1.0 / ((visits as f32) + 1.0).sqrt()
    }

    #[must_use]
    pub fn visits(&self, input: &FeatureInput) -> u32 {
        self.visits
            .get(&NoveltyKey::quantize(input))
            .copied()
            .unwrap_or(0)
    }

    /// One online step. Returns the mean absolute error measured before the step.
    pub fn update(&mut self, input: &FeatureInput, actual: &Outcome, lr: f32) -> f32 {
        let scale = lr * (0.4 + 0.6 * self.novelty(input));
        let error = self.step(input, actual, scale);
        *self.visits.entry(NoveltyKey::quantize(input)).or_insert(0) += 1;
        self.samples += 1;
        self.mean_error += (error - self.mean_error) / self.samples as f32;
        error
    }

    /// Replay fit: same gradient step, but visits and the running error are left alone.
    pub fn fit(&mut self, input: &FeatureInput, actual: &Outcome, lr: f32) -> f32 {
        self.step(input, actual, lr)
    }

    fn step(&mut self, input: &FeatureInput, actual: &Outcome, scale: f32) -> f32 {
        let predicted = self.predict(input);
        let error = predicted.mean_abs_error(actual);
        if self.frozen || !(scale > 0.0) {
            return error;
        }
        let x = input.values();
        let target = actual.to_array();
        let guess = predicted.to_array();
        for k in 0..OUTCOME_SIZE {
            let delta = target[k] - guess[k];
            for (w, v) in self.weights[k].iter_mut().zip(x.iter()) {
                *w += scale * delta * v;
            }
            self.bias[k] += scale * delta;
        }
        error
    }

    /// Freeze weights for ablation; predictions and error logging continue.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Streaming mean of the errors returned by [`Self::update`].
    #[must_use]
    pub const fn mean_prediction_error(&self) -> f32 {
        self.mean_error
    }

    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    #[must_use]
    pub const fn weights(&self) -> &[[f32; FEATURE_SIZE]; OUTCOME_SIZE] {
        &self.weights
    }

    #[must_use]
    pub const fn bias(&self) -> &[f32; OUTCOME_SIZE] {
        &self.bias
    }
}
