//! Single-parameter hill-climbing controller used while manufacturing.

use artificer_core::{
    Action, AgentId, ApplyStatus, ControllerConfig, Environment, Metric, ObjectId, pairs,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Controller state is tracked per object, metric, and target (in thousandths).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ControllerKey {
    pub object: ObjectId,
    pub metric: Metric,
    pub target_milli: u32,
}

impl ControllerKey {
    #[must_use]
    pub fn new(object: ObjectId, metric: Metric, target: f32) -> Self {
        Self {
            object,
            metric,
            target_milli: (target.clamp(0.0, 1.0) * 1000.0).round() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerPhase {
    #[default]
    Idle,
    SelectingTarget,
    Tuning,
    Evaluating,
    Converged,
    Blocked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ControllerState {
    pub param: f32,
    /// +1.0 or -1.0.
    pub direction: f32,
    pub best_error: f32,
    /// Pre-step error of the previous call.
    pub last_error: Option<f32>,
    pub phase: ControllerPhase,
    pub steps: u32,
}

/// Result of one controller call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ControlStep {
    pub phase: ControllerPhase,
    pub error_before: f32,
    pub error_after: f32,
    pub param: f32,
    /// Whether the process verb was actually applied.
    pub applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosedLoopController {
    config: ControllerConfig,
    #[serde(with = "pairs")]
    states: BTreeMap<ControllerKey, ControllerState>,
    phase: ControllerPhase,
}

impl ClosedLoopController {
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            states: BTreeMap::new(),
            phase: ControllerPhase::Idle,
        }
    }

    /// Most recent phase across all keys.
    #[must_use]
    pub const fn phase(&self) -> ControllerPhase {
        self.phase
    }

    #[must_use]
    pub fn state(&self, object: ObjectId, metric: Metric, target: f32) -> Option<&ControllerState> {
        self.states.get(&ControllerKey::new(object, metric, target))
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Note that a new workpiece/target pair is being chosen.
    pub fn select_target(&mut self) {
        self.phase = ControllerPhase::SelectingTarget;
    }

    /// Drive `metric` on `object` one step toward `target`.
    ///
    /// Returns `None` when the object cannot be measured.
    pub fn step<E: Environment + ?Sized>(
        &mut self,
        env: &mut E,
        agent: AgentId,
        object: ObjectId,
        metric: Metric,
        target: f32,
        rng: &mut dyn RngCore,
    ) -> Option<ControlStep> {
        let target = target.clamp(0.0, 1.0);
        let before = env.measure(object, metric, None, rng)?;
        let error_before = (target - before.value).abs();

        let config = &self.config;
        let key = ControllerKey::new(object, metric, target);
        let state = self.states.entry(key).or_insert_with(|| ControllerState {
            param: config.initial_param,
            direction: 1.0,
            best_error: f32::MAX,
            last_error: None,
            phase: ControllerPhase::Tuning,
            steps: 0,
        });
        // Blocked steps do not move the search state.
        let counterpart = if metric.requires_consumable() {
            let Some(id) = env.consumable_for(object, metric) else {
                state.phase = ControllerPhase::Blocked;
                state.best_error = state.best_error.min(error_before);
                self.phase = ControllerPhase::Blocked;
                debug!(?object, metric = metric.as_str(), "controller blocked: no consumable");
                return Some(ControlStep {
                    phase: ControllerPhase::Blocked,
                    error_before,
                    error_after: error_before,
                    param: state.param,
                    applied: false,
                });
            };
            Some(id)
        } else {
            None
        };
        state.phase = ControllerPhase::Tuning;

        if let Some(last) = state.last_error
            && error_before > last
        {
            state.direction = -state.direction;
        }
        state.last_error = Some(error_before);
        let step = if error_before > config.coarse_threshold {
            config.coarse_step
        } else {
            config.fine_step
        };
        state.param = (state.param + state.direction * step).clamp(0.0, 1.0);
        state.steps += 1;

        let action = Action::new(agent, metric.process_verb(), Some(object), counterpart)
            .with_intensity(state.param);
        let applied = env.apply(&action, rng) == ApplyStatus::Applied;
        let error_after = env
            .measure(object, metric, None, rng)
            .map_or(error_before, |after| (target - after.value).abs());
        state.best_error = state.best_error.min(error_after);
        state.phase = if error_after <= config.tolerance {
            ControllerPhase::Converged
        } else {
            ControllerPhase::Evaluating
        };
        self.phase = state.phase;
        Some(ControlStep {
            phase: state.phase,
            error_before,
            error_after,
            param: state.param,
            applied,
        })
    }
}
