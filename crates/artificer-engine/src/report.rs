//! Per-tick results handed to hosts.

use artificer_core::{Action, AgentId, Metric, ObjectId, PopulationDirective, Regime, Tick};
use artificer_learn::TrainingMetrics;
use serde::{Deserialize, Serialize};

use crate::metrics::AggregateMetrics;

/// How the executed action was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Scored,
    /// Energy below the floor or nothing to do.
    Rest,
    AnchorOverride,
    ControlOverride,
    ForcedExplore,
}

/// Notable state changes observed during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickEvent {
    RegimeChanged {
        from: Regime,
        to: Regime,
        reason: String,
    },
    StallDetected {
        agent: AgentId,
    },
    AnchorEstablished {
        object: ObjectId,
    },
    AnchorLost {
        object: ObjectId,
    },
    ControllerConverged {
        object: ObjectId,
        metric: Metric,
        error: f32,
    },
    ControllerBlocked {
        object: ObjectId,
        metric: Metric,
    },
    TrainingRateLimited,
    TrainingError {
        message: String,
    },
    PopulationAdjusted {
        spawned: usize,
        cleaned: usize,
    },
}

/// Everything that happened in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: Tick,
    pub sim_time: f32,
    pub agent: Option<AgentId>,
    pub action: Option<Action>,
    pub source: DecisionSource,
    pub regime: Regime,
    pub reward: f32,
    pub prediction_error: Option<f32>,
    pub candidates: usize,
    pub entropy: f32,
    pub metrics: AggregateMetrics,
    pub training: TrainingMetrics,
    pub directive: PopulationDirective,
    pub events: Vec<TickEvent>,
}
