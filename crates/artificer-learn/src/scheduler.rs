//! Rate-limited scheduler bounding time spent retraining from replay.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

const LOG_HORIZON_SECS: f64 = 90.0;
const SMOOTHING: f32 = 0.05;

/// Lifecycle of the training loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    #[default]
    Off,
    Collecting,
    Training,
    RateLimited,
    /// Host-reported failure; terminal until restarted.
    Error(String),
}

impl TrainingState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Collecting => "collecting",
            Self::Training => "training",
            Self::RateLimited => "rate_limited",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
struct StepRecord {
    at: f64,
    duration_ms: f32,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    pub steps_total: u64,
    pub steps_last_60s: usize,
    pub ms_last_1s: f32,
    pub ms_last_60s: f32,
    pub loss: Option<f32>,
    pub entropy: Option<f32>,
    pub state: TrainingState,
    pub replay_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrainingScheduler {
    state: TrainingState,
    log: VecDeque<StepRecord>,
    steps_total: u64,
    loss: Option<f32>,
    entropy: Option<f32>,
}

fn smooth(current: Option<f32>, sample: f32) -> Option<f32> {
    if !sample.is_finite() {
        return current;
    }
    Some(match current {
        Some(value) => value + SMOOTHING * (sample - value),
        None => sample,
    })
}

impl TrainingScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `collecting`; also clears a previous error.
    pub fn start(&mut self) {
        if self.state != TrainingState::Collecting {
            debug!(from = self.state.as_str(), "training scheduler started");
        }
        self.state = TrainingState::Collecting;
    }

    pub fn stop(&mut self) {
        self.state = TrainingState::Off;
    }

    #[must_use]
    pub const fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Whether steps may currently be recorded.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self.state, TrainingState::Off | TrainingState::Error(_))
    }

    /// Log one training step taken at simulated time `now`.
    pub fn record_step(&mut self, duration_ms: f32, loss: f32, entropy: f32, now: f64) -> bool {
        if !self.is_active() {
            return false;
        }
        self.log.push_back(StepRecord {
            at: now,
            duration_ms: duration_ms.max(0.0),
        });
        self.prune(now);
        self.steps_total += 1;
        self.loss = smooth(self.loss, loss);
        self.entropy = smooth(self.entropy, entropy);
        self.state = TrainingState::Training;
        true
    }

    pub fn record_rate_limited(&mut self) {
        if self.is_active() && self.state != TrainingState::RateLimited {
            debug!("training budget exhausted for this second");
            self.state = TrainingState::RateLimited;
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "training halted");
        self.state = TrainingState::Error(message);
    }

    fn prune(&mut self, now: f64) {
        while self
            .log
            .front()
            .is_some_and(|record| now - record.at > LOG_HORIZON_SECS)
        {
            self.log.pop_front();
        }
    }

    fn window_ms(&self, now: f64, secs: f64) -> (usize, f32) {
        self.log
            .iter()
            .filter(|record| now - record.at < secs)
            .fold((0, 0.0), |(count, ms), record| {
                (count + 1, ms + record.duration_ms)
            })
    }

    /// Milliseconds of training charged within the trailing second.
    #[must_use]
    pub fn ms_in_last_second(&self, now: f64) -> f32 {
        self.window_ms(now, 1.0).1
    }

    /// Whether another step fits in the per-second budget.
    #[must_use]
    pub fn has_budget(&self, now: f64, budget_ms_per_sec: f32) -> bool {
        self.is_active() && self.ms_in_last_second(now) < budget_ms_per_sec
    }

    #[must_use]
    pub fn metrics(&self, now: f64, replay_size: usize) -> TrainingMetrics {
        let (_, ms_last_1s) = self.window_ms(now, 1.0);
        let (steps_last_60s, ms_last_60s) = self.window_ms(now, 60.0);
        TrainingMetrics {
            steps_total: self.steps_total,
            steps_last_60s,
            ms_last_1s,
            ms_last_60s,
            loss: self.loss,
            entropy: self.entropy,
            state: self.state.clone(),
            replay_size,
        }
    }
}
