//! Capability surface the decision loop consumes from the simulated world.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    Action, AgentId, Measurement, Metric, ObjectId, Outcome, PERCEPT_SIZE, PopulationCounts,
    PopulationDirective, Position,
};

/// Broad classification of world objects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Raw material usable as a tool or workpiece.
    Raw,
    /// Breakable target objects.
    Target,
    /// Debris produced by breaking targets; the only kind cleanup may remove.
    Fragment,
    /// Consumable counterpart required by grinding.
    Abrasive,
}

/// Read-only view of an agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgentView {
    pub id: AgentId,
    pub position: Position,
    pub held: Option<ObjectId>,
    pub energy: f32,
}

/// Read-only view of an object's physical state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ObjectView {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub position: Position,
    /// Mass, hardness, sharpness, roughness, temperature.
    pub properties: [f32; PERCEPT_SIZE],
    pub geometry: f32,
    pub anchored: bool,
}

/// Result of submitting an action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    Applied,
    /// A referenced agent or object no longer resolves; nothing happened.
    Unresolved,
}

/// What the environment did in response to population pressure.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PressureReport {
    pub spawned: usize,
    pub cleaned: usize,
}

/// Black-box world the loop acts upon. All randomness is drawn from the supplied stream.
pub trait Environment {
    /// Live agents in a stable order.
    fn agents(&self) -> Vec<AgentId>;

    fn agent(&self, id: AgentId) -> Option<AgentView>;

    fn object(&self, id: ObjectId) -> Option<ObjectView>;

    /// Objects near `agent` (excluding anything it holds), nearest first.
    fn nearby_objects(&self, agent: AgentId, limit: usize) -> Vec<ObjectId>;

    /// Most relevant breakable target for `agent`.
    fn best_target(&self, agent: AgentId) -> Option<ObjectId>;

    /// Consumable counterpart needed to move `metric` on `object`, if one is available.
    fn consumable_for(&self, object: ObjectId, metric: Metric) -> Option<ObjectId>;

    /// Credit energy to an agent, saturating at its budget.
    fn replenish(&mut self, agent: AgentId, amount: f32);

    /// Spawn/decay hooks driven by the population controller.
    fn apply_pressure(
        &mut self,
        directive: &PopulationDirective,
        rng: &mut dyn RngCore,
    ) -> PressureReport;

    /// Apply an action synchronously.
    fn apply(&mut self, action: &Action, rng: &mut dyn RngCore) -> ApplyStatus;

    /// Outcome of the most recent interaction, if the last action produced one.
    fn last_outcome(&self) -> Option<Outcome>;

    /// Noisy reading of `metric` on `object`, optionally through an instrument.
    fn measure(
        &mut self,
        object: ObjectId,
        metric: Metric,
        instrument: Option<ObjectId>,
        rng: &mut dyn RngCore,
    ) -> Option<Measurement>;

    fn population(&self) -> PopulationCounts;
}
