//! Static configuration for the decision loop and its components.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::Metric;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Thresholds driving the explore → exploit → manufacture progression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegimeConfig {
    /// Simulated seconds that must elapse before exploit can be entered.
    pub min_explore_secs: f32,
    /// Running mean prediction error at or below which exploit is entered.
    pub exploit_error_threshold: f32,
    /// Regime dwell (seconds) required before manufacture can be entered.
    pub manufacture_min_dwell_secs: f32,
    /// Trailing window (seconds) used for the stability statistics.
    pub stability_window_secs: f32,
    /// Novel interactions per minute must average below this.
    pub max_novel_per_minute: f32,
    /// Windowed prediction error must average below this.
    pub max_prediction_error: f32,
    /// Variance of resource gained per minute must fall below this.
    pub max_resource_variance: f32,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            min_explore_secs: 25.0,
            exploit_error_threshold: 0.22,
            manufacture_min_dwell_secs: 20.0,
            stability_window_secs: 30.0,
            max_novel_per_minute: 8.0,
            max_prediction_error: 0.20,
            max_resource_variance: 120.0,
        }
    }
}

/// Loop/spam detector parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StallConfig {
    /// Rolling window length in recorded ticks.
    pub window: usize,
    /// Samples required before a stall can be declared.
    pub min_samples: usize,
    /// Reward delta below which the window is considered flat.
    pub epsilon: f32,
    /// Distinct targets that must be touched for a flat window to be acceptable.
    pub min_targets: usize,
    /// Consecutive identical verbs at the tail that count as spam.
    pub repeat_threshold: usize,
    /// Ticks of forced exploration armed after a stall.
    pub cooldown_ticks: u32,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            window: 40,
            min_samples: 5,
            epsilon: 0.005,
            min_targets: 1,
            repeat_threshold: 15,
            cooldown_ticks: 10,
        }
    }
}

/// Hill-climbing controller parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    pub initial_param: f32,
    pub coarse_step: f32,
    pub fine_step: f32,
    /// Error above which the coarse step is used.
    pub coarse_threshold: f32,
    /// Error at or below which the controller reports convergence.
    pub tolerance: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            initial_param: 0.5,
            coarse_step: 0.15,
            fine_step: 0.06,
            coarse_threshold: 0.2,
            tolerance: 0.08,
        }
    }
}

/// Healthy population band enforced by the population controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PopulationBands {
    pub min_targets: usize,
    pub max_targets: usize,
    pub min_objects: usize,
    pub max_objects: usize,
    pub max_fragment_ratio: f32,
}

impl Default for PopulationBands {
    fn default() -> Self {
        Self {
            min_targets: 3,
            max_targets: 24,
            min_objects: 12,
            max_objects: 120,
            max_fragment_ratio: 0.5,
        }
    }
}

/// Replay retraining budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    pub enabled: bool,
    pub replay_capacity: usize,
    /// Ticks between replay retraining passes.
    pub interval_ticks: u64,
    pub batch_size: usize,
    /// Milliseconds of training allowed per simulated second.
    pub budget_ms_per_sec: f32,
    pub prioritized: bool,
    pub priority_alpha: f32,
    pub learning_rate: f32,
    /// Cost charged per fitted sample when running deterministically.
    pub simulated_cost_ms: f32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            replay_capacity: 2_048,
            interval_ticks: 10,
            batch_size: 32,
            budget_ms_per_sec: 4.0,
            prioritized: true,
            priority_alpha: 0.6,
            learning_rate: 0.02,
            simulated_cost_ms: 0.05,
        }
    }
}

/// Tool-effect embedding parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// EMA weight given to the newest outcome.
    pub decay: f32,
    /// Cosine similarity above which two tools share a cluster.
    pub cluster_similarity: f32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            decay: 0.2,
            cluster_similarity: 0.9,
        }
    }
}

/// Reference sandbox environment parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    pub world_width: f32,
    pub world_height: f32,
    pub agents: usize,
    pub initial_raw: usize,
    pub initial_targets: usize,
    pub initial_abrasives: usize,
    /// Probability scale for spawning a target when the throttle is fully open.
    pub spawn_rate: f32,
    pub max_energy: f32,
    pub action_energy_cost: f32,
    pub rest_energy_gain: f32,
    pub measurement_sigma: f32,
    pub fragment_jitter: f32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            world_width: 400.0,
            world_height: 400.0,
            agents: 2,
            initial_raw: 14,
            initial_targets: 8,
            initial_abrasives: 3,
            spawn_rate: 0.2,
            max_energy: 1.0,
            action_energy_cost: 0.06,
            rest_energy_gain: 0.1,
            measurement_sigma: 0.01,
            fragment_jitter: 0.05,
        }
    }
}

/// Metric/target pair cycled through by the manufacture regime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ControlTarget {
    pub metric: Metric,
    pub target: f32,
}

/// Top-level configuration for an Artificer run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ArtificerConfig {
    /// Seed for the single pseudo-random stream.
    pub rng_seed: u64,
    /// Round-robin agent selection and simulated training cost.
    pub deterministic: bool,
    pub tick_rate_hz: f32,
    /// Energy below which the only legal action is REST.
    pub energy_floor: f32,
    /// Energy credited to the active agent each tick.
    pub energy_replenish: f32,
    /// Learning rate for the online model update.
    pub learning_rate: f32,
    /// Length of the short-horizon repeat window used by curiosity scoring.
    pub recent_window: usize,
    pub pickup_candidates: usize,
    pub neighbor_candidates: usize,
    /// Ticks between forced ANCHOR attempts while no anchor exists.
    pub anchor_cadence: u64,
    /// Ticks between forced CONTROL steps once an anchor exists.
    pub control_cadence: u64,
    pub control_targets: Vec<ControlTarget>,
    pub regime: RegimeConfig,
    pub stall: StallConfig,
    pub controller: ControllerConfig,
    pub population: PopulationBands,
    pub training: TrainingConfig,
    pub embedding: EmbeddingConfig,
    pub sandbox: SandboxConfig,
}

impl Default for ArtificerConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            deterministic: true,
            tick_rate_hz: 10.0,
            energy_floor: 0.15,
            energy_replenish: 0.02,
            learning_rate: 0.05,
            recent_window: 20,
            pickup_candidates: 3,
            neighbor_candidates: 2,
            anchor_cadence: 10,
            control_cadence: 4,
            control_targets: vec![
                ControlTarget {
                    metric: Metric::SurfacePlanarity,
                    target: 0.85,
                },
                ControlTarget {
                    metric: Metric::MicrostructureOrder,
                    target: 0.7,
                },
                ControlTarget {
                    metric: Metric::ImpurityLevel,
                    target: 0.1,
                },
            ],
            regime: RegimeConfig::default(),
            stall: StallConfig::default(),
            controller: ControllerConfig::default(),
            population: PopulationBands::default(),
            training: TrainingConfig::default(),
            embedding: EmbeddingConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl ArtificerConfig {
    /// Parse a JSON document, filling unspecified fields with defaults.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    /// Number of ticks covered by the regime stability window.
    #[must_use]
    pub fn stability_window_ticks(&self) -> usize {
        ((self.regime.stability_window_secs * self.tick_rate_hz).round() as usize).max(1)
    }

    /// Reject values the loop cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_rate_hz > 0.0) {
            return Err(ConfigError::InvalidConfig("tick_rate_hz must be positive"));
        }
        if self.energy_floor < 0.0 || self.energy_replenish < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "energy_floor and energy_replenish must be non-negative",
            ));
        }
        if !(self.learning_rate > 0.0) || !(self.training.learning_rate > 0.0) {
            return Err(ConfigError::InvalidConfig("learning rates must be positive"));
        }
        if self.recent_window == 0 {
            return Err(ConfigError::InvalidConfig("recent_window must be non-zero"));
        }
        if self.anchor_cadence == 0 || self.control_cadence == 0 {
            return Err(ConfigError::InvalidConfig(
                "anchor_cadence and control_cadence must be non-zero",
            ));
        }
        if self
            .control_targets
            .iter()
            .any(|target| !(0.0..=1.0).contains(&target.target))
        {
            return Err(ConfigError::InvalidConfig(
                "control targets must lie in [0, 1]",
            ));
        }
        if self.stall.window == 0
            || self.stall.min_samples == 0
            || self.stall.min_samples > self.stall.window
        {
            return Err(ConfigError::InvalidConfig(
                "stall window must be non-zero and hold at least min_samples",
            ));
        }
        if self.stall.repeat_threshold == 0 || self.stall.epsilon < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "stall repeat_threshold must be non-zero and epsilon non-negative",
            ));
        }
        let controller = &self.controller;
        if !(0.0..=1.0).contains(&controller.initial_param)
            || controller.coarse_step <= 0.0
            || controller.fine_step <= 0.0
            || controller.tolerance < 0.0
        {
            return Err(ConfigError::InvalidConfig(
                "controller steps must be positive and initial_param in [0, 1]",
            ));
        }
        let bands = &self.population;
        if bands.min_targets > bands.max_targets || bands.min_objects > bands.max_objects {
            return Err(ConfigError::InvalidConfig(
                "population minima cannot exceed maxima",
            ));
        }
        if bands.max_targets == 0 || bands.max_objects == 0 {
            return Err(ConfigError::InvalidConfig(
                "population maxima must be non-zero",
            ));
        }
        if !(0.0..1.0).contains(&bands.max_fragment_ratio) {
            return Err(ConfigError::InvalidConfig(
                "max_fragment_ratio must lie in [0, 1)",
            ));
        }
        let training = &self.training;
        if training.replay_capacity == 0 || training.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "replay_capacity and batch_size must be non-zero",
            ));
        }
        if training.interval_ticks == 0
            || training.budget_ms_per_sec < 0.0
            || training.priority_alpha < 0.0
            || training.simulated_cost_ms < 0.0
        {
            return Err(ConfigError::InvalidConfig(
                "training interval must be non-zero and budgets non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.embedding.decay)
            || !(-1.0..=1.0).contains(&self.embedding.cluster_similarity)
        {
            return Err(ConfigError::InvalidConfig(
                "embedding decay must lie in [0, 1] and similarity in [-1, 1]",
            ));
        }
        let sandbox = &self.sandbox;
        let finite = [
            sandbox.world_width,
            sandbox.world_height,
            sandbox.spawn_rate,
            sandbox.max_energy,
            sandbox.action_energy_cost,
            sandbox.rest_energy_gain,
            sandbox.measurement_sigma,
            sandbox.fragment_jitter,
        ];
        if finite.iter().any(|value| !value.is_finite()) {
            return Err(ConfigError::InvalidConfig(
                "sandbox parameters must be finite",
            ));
        }
        if sandbox.fragment_jitter < 0.0 || sandbox.rest_energy_gain < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "sandbox jitter and rest gain must be non-negative",
            ));
        }
        if sandbox.world_width <= 0.0 || sandbox.world_height <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "sandbox dimensions must be positive",
            ));
        }
        if sandbox.max_energy <= 0.0
            || sandbox.action_energy_cost < 0.0
            || sandbox.measurement_sigma < 0.0
            || sandbox.spawn_rate < 0.0
        {
            return Err(ConfigError::InvalidConfig(
                "sandbox energy must be positive and rates non-negative",
            ));
        }
        Ok(())
    }
}
