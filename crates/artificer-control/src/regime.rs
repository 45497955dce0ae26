//! One-directional explore → exploit → manufacture state machine.

use artificer_core::{Regime, RegimeConfig};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegimeTransition {
    pub from: Regime,
    pub to: Regime,
    /// Simulated seconds at which the transition fired.
    pub at: f32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct Rolling {
    values: VecDeque<f32>,
}

impl Rolling {
    fn push(&mut self, value: f32, capacity: usize) {
        if self.values.len() == capacity {
            self.values.pop_front();
        }
        self.values.push_back(if value.is_finite() { value } else { 0.0 });
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn mean(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }

    /// Population variance.
    fn variance(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        self.values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f32>()
            / self.values.len() as f32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegimeMachine {
    config: RegimeConfig,
    window_ticks: usize,
    regime: Regime,
    since: f32,
    reason: String,
    novel_per_minute: Rolling,
    resource_per_minute: Rolling,
    /// One slot per tick; `None` for ticks without an interaction.
    prediction_errors: VecDeque<Option<f32>>,
    pending_error: Option<f32>,
    errors_observed: u64,
    transitions: Vec<RegimeTransition>,
}

impl RegimeMachine {
    /// `window_ticks` is the stability window already converted to ticks.
    #[must_use]
    pub fn new(config: RegimeConfig, window_ticks: usize) -> Self {
        Self {
            config,
            window_ticks: window_ticks.max(1),
            regime: Regime::Explore,
            since: 0.0,
            reason: "initial".to_owned(),
            novel_per_minute: Rolling::default(),
            resource_per_minute: Rolling::default(),
            prediction_errors: VecDeque::new(),
            pending_error: None,
            errors_observed: 0,
            transitions: Vec::new(),
        }
    }

    #[must_use]
    pub const fn regime(&self) -> Regime {
        self.regime
    }

    /// Simulated seconds at which the current regime was entered.
    #[must_use]
    pub const fn since(&self) -> f32 {
        self.since
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    #[must_use]
    pub fn transitions(&self) -> &[RegimeTransition] {
        &self.transitions
    }

    /// Mean prediction error over the ticks in the stability window that had one.
    #[must_use]
    pub fn windowed_prediction_error(&self) -> f32 {
        let (sum, count) = self
            .prediction_errors
            .iter()
            .flatten()
            .fold((0.0, 0_usize), |(sum, count), error| (sum + error, count + 1));
        if count == 0 { 0.0 } else { sum / count as f32 }
    }

    /// Record this tick's prediction error; it enters the window on the next `record_tick`.
    pub fn observe_prediction_error(&mut self, error: f32) {
        if error.is_finite() {
            self.pending_error = Some(error);
            self.errors_observed += 1;
        }
    }

    /// Close one tick: append its rolling rates and any observed prediction error.
    pub fn record_tick(&mut self, novel_per_minute: f32, resource_per_minute: f32) {
        self.novel_per_minute.push(novel_per_minute, self.window_ticks);
        self.resource_per_minute
            .push(resource_per_minute, self.window_ticks);
        if self.prediction_errors.len() == self.window_ticks {
            self.prediction_errors.pop_front();
        }
        self.prediction_errors.push_back(self.pending_error.take());
    }

    /// Evaluate transition rules at simulated time `now`.
    pub fn evaluate(&mut self, now: f32, model_mean_error: f32) -> Option<RegimeTransition> {
        let config = &self.config;
        let reason = match self.regime {
            Regime::Explore
                if now > config.min_explore_secs
                    && self.errors_observed > 0
                    && model_mean_error <= config.exploit_error_threshold =>
            {
                Some((
                    Regime::Exploit,
                    format!(
                        "elapsed {now:.1}s > {:.1}s and mean prediction error {model_mean_error:.3} <= {:.3}",
                        config.min_explore_secs, config.exploit_error_threshold
                    ),
                ))
            }
            Regime::Explore | Regime::Exploit => self.stability_reason(now),
            Regime::Manufacture => None,
        };
        let (to, reason) = reason?;
        let transition = RegimeTransition {
            from: self.regime,
            to,
            at: now,
            reason,
        };
        info!(
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            at = now,
            reason = %transition.reason,
            "regime transition"
        );
        self.regime = to;
        self.since = now;
        self.reason = transition.reason.clone();
        self.transitions.push(transition.clone());
        Some(transition)
    }

    fn stability_reason(&self, now: f32) -> Option<(Regime, String)> {
        let config = &self.config;
        let dwell = now - self.since;
        if dwell <= config.manufacture_min_dwell_secs
            || self.novel_per_minute.len() < self.window_ticks
            || self.resource_per_minute.len() < self.window_ticks
            || self.errors_observed == 0
        {
            return None;
        }
        let novel = self.novel_per_minute.mean();
        let error = self.windowed_prediction_error();
        let variance = self.resource_per_minute.variance();
        if novel < config.max_novel_per_minute
            && error < config.max_prediction_error
            && variance < config.max_resource_variance
        {
            Some((
                Regime::Manufacture,
                format!(
                    "dwell {dwell:.1}s, novel/min {novel:.2} < {:.2}, prediction error {error:.3} < {:.3}, resource/min variance {variance:.2} < {:.2}",
                    config.max_novel_per_minute, config.max_prediction_error, config.max_resource_variance
                ),
            ))
        } else {
            None
        }
    }
}
