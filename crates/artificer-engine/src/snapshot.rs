//! Deep-copied engine state for export, replay, and determinism checks.

use artificer_control::{ClosedLoopController, PopulationController, RegimeMachine, StallDetector};
use artificer_core::{
    AgentId, LinearWeights, ObjectId, PopulationDirective, RngState, Tick, Verb, pairs,
};
use artificer_learn::{OutcomeModel, ReplayBuffer, ToolEffectEmbedding, TrainingScheduler};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::candidates::RecentWindow;
use crate::metrics::{AggregateMetrics, RollingMetrics};

/// Current snapshot layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Per-agent memory kept by the loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentMemory {
    pub recent: RecentWindow,
    pub total_reward: f32,
    pub actions: u64,
    pub last_verb: Option<Verb>,
}

/// Loop-owned component state beyond the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineState {
    pub replay: ReplayBuffer,
    pub embedding: ToolEffectEmbedding,
    pub scheduler: TrainingScheduler,
    pub controller: ClosedLoopController,
    pub stall: StallDetector,
    pub population: PopulationController,
    pub regime: RegimeMachine,
    pub agent_cursor: usize,
    pub anchor: Option<ObjectId>,
    pub control_round: usize,
    pub directive: PopulationDirective,
    pub rolling: RollingMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSnapshot {
    pub version: u32,
    pub tick: Tick,
    pub sim_time: f32,
    pub rng: RngState,
    pub metrics: AggregateMetrics,
    pub model: OutcomeModel,
    pub perception: LinearWeights,
    #[serde(with = "pairs")]
    pub agents: BTreeMap<AgentId, AgentMemory>,
    pub state: EngineState,
}
