//! Core types shared across the Artificer workspace.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

pub mod config;
pub mod env;
pub mod pairs;
pub mod perception;
pub mod rng;
pub mod sandbox;

pub use config::{
    ArtificerConfig, ConfigError, ControlTarget, ControllerConfig, EmbeddingConfig,
    PopulationBands, RegimeConfig, SandboxConfig, StallConfig, TrainingConfig,
};
pub use env::{AgentView, ApplyStatus, Environment, ObjectKind, ObjectView, PressureReport};
pub use perception::{HiddenEstimate, LinearPerception, LinearWeights, Perception, ShapeError};
pub use rng::{RngState, SimRng};
pub use sandbox::SandboxWorld;

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
    /// Stable handle for world objects (tools, targets, fragments, abrasives).
    pub struct ObjectId;
}

/// Number of perceptual scalars observed per object.
pub const PERCEPT_SIZE: usize = 5;
/// Number of one-hot slots reserved for interaction verbs.
pub const VERB_SLOTS: usize = 3;
/// Length of the feature vector fed to the outcome model.
pub const FEATURE_SIZE: usize = 2 * PERCEPT_SIZE + 2 + VERB_SLOTS;
/// Number of outcome coordinates predicted per interaction.
pub const OUTCOME_SIZE: usize = 4;

/// Index of the mass scalar inside an observation.
pub const MASS: usize = 0;
/// Index of the hardness scalar inside an observation.
pub const HARDNESS: usize = 1;
/// Index of the sharpness scalar inside an observation.
pub const SHARPNESS: usize = 2;
/// Index of the roughness scalar inside an observation.
pub const ROUGHNESS: usize = 3;
/// Index of the temperature scalar inside an observation.
pub const TEMPERATURE: usize = 4;

fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn non_negative(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.max(0.0) }
}

/// High level simulation clock (ticks processed since boot).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Simulated seconds elapsed at this tick for the given tick rate.
    #[must_use]
    pub fn seconds(self, tick_rate_hz: f32) -> f32 {
        self.0 as f32 / tick_rate_hz.max(f32::EPSILON)
    }
}

/// Axis-aligned 2D position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Closed set of actions an agent may take.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verb {
    PickUp,
    MoveTo,
    Drop,
    StrikeWith,
    BindTo,
    Grind,
    Heat,
    Soak,
    Anchor,
    Control,
    Rest,
}

impl Verb {
    /// One-hot slot used in the feature vector, if the verb is an interaction verb.
    #[must_use]
    pub const fn slot(self) -> Option<usize> {
        match self {
            Self::StrikeWith => Some(0),
            Self::BindTo => Some(1),
            Self::Grind => Some(2),
            Self::PickUp
            | Self::MoveTo
            | Self::Drop
            | Self::Heat
            | Self::Soak
            | Self::Anchor
            | Self::Control
            | Self::Rest => None,
        }
    }

    /// Verbs the stall override may fall back to.
    #[must_use]
    pub const fn is_exploratory(self) -> bool {
        matches!(self, Self::PickUp | Self::MoveTo | Self::Drop)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PickUp => "PICK_UP",
            Self::MoveTo => "MOVE_TO",
            Self::Drop => "DROP",
            Self::StrikeWith => "STRIKE_WITH",
            Self::BindTo => "BIND_TO",
            Self::Grind => "GRIND",
            Self::Heat => "HEAT",
            Self::Soak => "SOAK",
            Self::Anchor => "ANCHOR",
            Self::Control => "CONTROL",
            Self::Rest => "REST",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Macro behavioural mode of the agent population.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    #[default]
    Explore,
    Exploit,
    Manufacture,
}

impl Regime {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explore => "explore",
            Self::Exploit => "exploit",
            Self::Manufacture => "manufacture",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measurable property driven by the closed-loop controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SurfacePlanarity,
    MicrostructureOrder,
    ImpurityLevel,
}

impl Metric {
    /// Physical verb that moves this metric.
    #[must_use]
    pub const fn process_verb(self) -> Verb {
        match self {
            Self::SurfacePlanarity => Verb::Grind,
            Self::MicrostructureOrder => Verb::Heat,
            Self::ImpurityLevel => Verb::Soak,
        }
    }

    /// Whether applying the process verb consumes a counterpart object (an abrasive).
    #[must_use]
    pub const fn requires_consumable(self) -> bool {
        matches!(self, Self::SurfacePlanarity)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SurfacePlanarity => "surface_planarity",
            Self::MicrostructureOrder => "microstructure_order",
            Self::ImpurityLevel => "impurity_level",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Noisy reading returned by the environment's measurement capability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    pub value: f32,
    pub sigma: f32,
    pub sample_count: u32,
}

/// Perceived view of one object: five perceptual scalars plus a geometry scalar.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub features: [f32; PERCEPT_SIZE],
    pub geometry: f32,
}

impl Observation {
    /// Construct an observation, clamping every scalar into `[0, 1]`.
    #[must_use]
    pub fn new(features: [f32; PERCEPT_SIZE], geometry: f32) -> Self {
        Self {
            features: features.map(clamp01),
            geometry: clamp01(geometry),
        }
    }

    #[must_use]
    pub fn mass(&self) -> f32 {
        self.features[MASS]
    }
}

/// Fixed-size model input encoding two participants, geometry, relative position and verb.
///
/// Every scalar lies in `[0, 1]`; the verb block is one-hot with at most one slot set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureInput {
    values: [f32; FEATURE_SIZE],
}

impl FeatureInput {
    const GEOMETRY: usize = 2 * PERCEPT_SIZE;
    const RELATIVE: usize = 2 * PERCEPT_SIZE + 1;
    const VERBS: usize = 2 * PERCEPT_SIZE + 2;

    /// Encode an interaction between a tool and a target.
    #[must_use]
    pub fn new(
        tool: &Observation,
        target: &Observation,
        geometry: f32,
        relative_position: f32,
        verb: Verb,
    ) -> Self {
        let mut values = [0.0; FEATURE_SIZE];
        values[..PERCEPT_SIZE].copy_from_slice(&tool.features);
        values[PERCEPT_SIZE..Self::GEOMETRY].copy_from_slice(&target.features);
        values[Self::GEOMETRY] = geometry;
        values[Self::RELATIVE] = relative_position;
        if let Some(slot) = verb.slot() {
            values[Self::VERBS + slot] = 1.0;
        }
        Self::from_values(values)
    }

    /// Build from raw values, clamping scalars and normalising the one-hot block.
    #[must_use]
    pub fn from_values(values: [f32; FEATURE_SIZE]) -> Self {
        let mut values = values.map(clamp01);
        let mut seen = false;
        for slot in &mut values[Self::VERBS..] {
            if !seen && *slot >= 0.5 {
                *slot = 1.0;
                seen = true;
            } else {
                *slot = 0.0;
            }
        }
        Self { values }
    }

    #[must_use]
    pub const fn values(&self) -> &[f32; FEATURE_SIZE] {
        &self.values
    }

    /// Verb slot set in the one-hot block.
    #[must_use]
    pub fn verb_slot(&self) -> Option<usize> {
        self.values[Self::VERBS..]
            .iter()
            .position(|value| *value >= 0.5)
    }

    #[must_use]
    pub fn tool_mass(&self) -> f32 {
        self.values[MASS]
    }

    #[must_use]
    pub fn target_mass(&self) -> f32 {
        self.values[PERCEPT_SIZE + MASS]
    }

    #[must_use]
    pub fn geometry(&self) -> f32 {
        self.values[Self::GEOMETRY]
    }

    #[must_use]
    pub fn relative_position(&self) -> f32 {
        self.values[Self::RELATIVE]
    }
}

/// Outcome vector of one interaction; every coordinate is non-negative.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub damage: f32,
    pub tool_wear: f32,
    pub fragments: f32,
    pub property_changes: f32,
}

impl Outcome {
    pub const ZERO: Self = Self {
        damage: 0.0,
        tool_wear: 0.0,
        fragments: 0.0,
        property_changes: 0.0,
    };

    #[must_use]
    pub fn new(damage: f32, tool_wear: f32, fragments: f32, property_changes: f32) -> Self {
        Self {
            damage: non_negative(damage),
            tool_wear: non_negative(tool_wear),
            fragments: non_negative(fragments),
            property_changes: non_negative(property_changes),
        }
    }

    /// Build from an array, ReLU-clamping each coordinate.
    #[must_use]
    pub fn from_array(values: [f32; OUTCOME_SIZE]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    #[must_use]
    pub const fn to_array(&self) -> [f32; OUTCOME_SIZE] {
        [
            self.damage,
            self.tool_wear,
            self.fragments,
            self.property_changes,
        ]
    }

    /// Mean absolute error across all four coordinates.
    #[must_use]
    pub fn mean_abs_error(&self, other: &Self) -> f32 {
        let a = self.to_array();
        let b = other.to_array();
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum::<f32>() / OUTCOME_SIZE as f32
    }

    /// Mean absolute error across the directly observable coordinates
    /// (damage, tool wear, fragments).
    #[must_use]
    pub fn observable_error(&self, other: &Self) -> f32 {
        ((self.damage - other.damage).abs()
            + (self.tool_wear - other.tool_wear).abs()
            + (self.fragments - other.fragments).abs())
            / 3.0
    }

    /// Predicted task value net of tool cost.
    #[must_use]
    pub fn utility(&self) -> f32 {
        0.40 * self.damage + 0.25 * self.fragments + 0.20 * self.property_changes
            - 0.15 * self.tool_wear
    }

    /// Realised effectiveness used as the reward signal.
    #[must_use]
    pub fn effectiveness(&self) -> f32 {
        self.damage + 0.4 * self.fragments - 0.3 * self.tool_wear
    }
}

/// Concrete action submitted to the environment.
///
/// `object` is the primary participant (held tool, item to pick up, workpiece);
/// `target` is the counterpart (struck target, binding partner, abrasive).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub agent: AgentId,
    pub verb: Verb,
    pub object: Option<ObjectId>,
    pub target: Option<ObjectId>,
    pub intensity: f32,
}

impl Action {
    #[must_use]
    pub fn new(
        agent: AgentId,
        verb: Verb,
        object: Option<ObjectId>,
        target: Option<ObjectId>,
    ) -> Self {
        Self {
            agent,
            verb,
            object,
            target,
            intensity: 1.0,
        }
    }

    #[must_use]
    pub fn rest(agent: AgentId) -> Self {
        Self::new(agent, Verb::Rest, None, None)
    }

    #[must_use]
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = clamp01(intensity);
        self
    }
}

/// Population counts reported by the environment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PopulationCounts {
    pub targets_alive: usize,
    pub objects_total: usize,
    pub fragments_total: usize,
}

/// Spawn throttle and debris cleanup recommended by the population controller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PopulationDirective {
    pub spawn_probability: f32,
    pub debris_to_clean: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(mass: f32) -> Observation {
        Observation::new([mass, 0.5, 0.5, 0.5, 0.5], 0.3)
    }

    #[test]
    fn feature_input_clamps_and_encodes_verb() {
        let tool = Observation::new([1.7, -0.2, 0.5, 0.5, 0.5], 0.4);
        let input = FeatureInput::new(&tool, &observation(0.25), 0.4, 2.0, Verb::BindTo);
        assert!(input.values().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(input.tool_mass(), 1.0);
        assert_eq!(input.target_mass(), 0.25);
        assert_eq!(input.relative_position(), 1.0);
        assert_eq!(input.verb_slot(), Some(1));
    }

    #[test]
    fn feature_input_one_hot_keeps_single_slot() {
        let mut values = [0.5; FEATURE_SIZE];
        values[FEATURE_SIZE - 3] = 1.0;
        values[FEATURE_SIZE - 2] = 1.0;
        values[FEATURE_SIZE - 1] = 1.0;
        let input = FeatureInput::from_values(values);
        let ones = input.values()[FEATURE_SIZE - 3..]
            .iter()
            .filter(|v| **v == 1.0)
            .count();
        assert_eq!(ones, 1);
        assert_eq!(input.verb_slot(), Some(0));
    }

    #[test]
    fn non_interaction_verbs_leave_one_hot_empty() {
        let input = FeatureInput::new(
            &observation(0.1),
            &observation(0.2),
            0.0,
            0.0,
            Verb::PickUp,
        );
        assert_eq!(input.verb_slot(), None);
    }

    #[test]
    fn outcome_is_relu_clamped() {
        let outcome = Outcome::from_array([-1.0, 0.2, f32::NAN, 0.3]);
        assert_eq!(outcome.damage, 0.0);
        assert_eq!(outcome.fragments, 0.0);
        assert_eq!(outcome.tool_wear, 0.2);
    }

    #[test]
    fn outcome_scoring_weights() {
        let outcome = Outcome::new(1.0, 1.0, 1.0, 1.0);
        assert!((outcome.utility() - 0.70).abs() < 1e-6);
        assert!((outcome.effectiveness() - 1.1).abs() < 1e-6);
        let other = Outcome::new(0.0, 1.0, 0.0, 0.0);
        assert!((outcome.observable_error(&other) - 2.0 / 3.0).abs() < 1e-6);
        assert!((outcome.mean_abs_error(&other) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn tick_seconds_follow_rate() {
        assert_eq!(Tick(25).seconds(10.0), 2.5);
        assert_eq!(Tick::zero().next(), Tick(1));
    }
}
