//! Perception capability: noisy observation plus a linear hidden-property estimate.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::env::ObjectView;
use crate::{HARDNESS, MASS, Observation, PERCEPT_SIZE, ROUGHNESS, SHARPNESS};

/// Number of hidden properties estimated from an observation.
pub const HIDDEN_SIZE: usize = 3;

/// Raised when restoring weights whose shape does not match the perception model.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("perception weights expected {expected_rows}x{expected_cols}, received {rows}x{cols}")]
pub struct ShapeError {
    pub expected_rows: usize,
    pub expected_cols: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Estimated hidden material properties.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct HiddenEstimate {
    pub toughness: f32,
    pub brittleness: f32,
    pub workability: f32,
}

impl HiddenEstimate {
    /// Heuristic used to rank objects worth picking up.
    #[must_use]
    pub fn desirability(&self) -> f32 {
        (0.5 * self.toughness + 0.3 * self.workability + 0.2 * (1.0 - self.brittleness))
            .clamp(0.0, 1.0)
    }
}

/// Row-major dense weights exported in snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearWeights {
    pub rows: usize,
    pub cols: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Perception consumed by the decision loop.
pub trait Perception {
    fn observe(&self, object: &ObjectView, rng: &mut dyn RngCore) -> Observation;

    fn predict(&self, observation: &Observation) -> HiddenEstimate;

    /// Deep copy of the model parameters.
    fn weights(&self) -> LinearWeights;

    fn load_weights(&mut self, weights: &LinearWeights) -> Result<(), ShapeError>;
}

/// Uniform observation noise with a fixed linear hidden-property readout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearPerception {
    noise: f32,
    weights: [[f32; PERCEPT_SIZE]; HIDDEN_SIZE],
    bias: [f32; HIDDEN_SIZE],
}

impl Default for LinearPerception {
    fn default() -> Self {
        Self::new(0.02)
    }
}

impl LinearPerception {
    #[must_use]
    pub fn new(noise: f32) -> Self {
        let mut weights = [[0.0; PERCEPT_SIZE]; HIDDEN_SIZE];
        // toughness
        weights[0][MASS] = 0.4;
        weights[0][HARDNESS] = 0.6;
        // brittleness
        weights[1][HARDNESS] = 0.7;
        weights[1][SHARPNESS] = 0.3;
        // workability
        weights[2][ROUGHNESS] = -0.5;
        weights[2][SHARPNESS] = 0.4;
        Self {
            noise: noise.max(0.0),
            weights,
            bias: [0.0, -0.1, 0.5],
        }
    }
}

impl Perception for LinearPerception {
    fn observe(&self, object: &ObjectView, rng: &mut dyn RngCore) -> Observation {
        let mut features = object.properties;
        if self.noise > 0.0 {
            for value in &mut features {
                *value += rng.random_range(-self.noise..self.noise);
            }
        }
        Observation::new(features, object.geometry)
    }

    fn predict(&self, observation: &Observation) -> HiddenEstimate {
        let mut out = self.bias;
        for (row, acc) in self.weights.iter().zip(out.iter_mut()) {
            *acc += row
                .iter()
                .zip(observation.features.iter())
                .map(|(w, x)| w * x)
                .sum::<f32>();
            *acc = acc.clamp(0.0, 1.0);
        }
        HiddenEstimate {
            toughness: out[0],
            brittleness: out[1],
            workability: out[2],
        }
    }

    fn weights(&self) -> LinearWeights {
        LinearWeights {
            rows: HIDDEN_SIZE,
            cols: PERCEPT_SIZE,
            weights: self.weights.iter().flatten().copied().collect(),
            bias: self.bias.to_vec(),
        }
    }

    fn load_weights(&mut self, weights: &LinearWeights) -> Result<(), ShapeError> {
        if weights.rows != HIDDEN_SIZE
            || weights.cols != PERCEPT_SIZE
            || weights.weights.len() != HIDDEN_SIZE * PERCEPT_SIZE
            || weights.bias.len() != HIDDEN_SIZE
        {
            return Err(ShapeError {
                expected_rows: HIDDEN_SIZE,
                expected_cols: PERCEPT_SIZE,
                rows: weights.rows,
                cols: weights.cols,
            });
        }
        for (row, chunk) in self
            .weights
            .iter_mut()
            .zip(weights.weights.chunks_exact(PERCEPT_SIZE))
        {
            row.copy_from_slice(chunk);
        }
        self.bias.copy_from_slice(&weights.bias);
        Ok(())
    }
}
