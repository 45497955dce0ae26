//! Reference environment: a small 2-D world of objects with continuous material properties.
//!
//! The interaction math here is deliberately simple and bounded; it exists so the decision
//! loop can be exercised headless and deterministically.

use ordered_float::OrderedFloat;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::config::SandboxConfig;
use crate::env::{AgentView, ApplyStatus, Environment, ObjectKind, ObjectView, PressureReport};
use crate::{
    Action, AgentId, Measurement, Metric, ObjectId, Outcome, PopulationCounts,
    PopulationDirective, Position, Verb,
};

/// Continuous material state of an object.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Material {
    pub mass: f32,
    pub hardness: f32,
    pub sharpness: f32,
    pub roughness: f32,
    pub temperature: f32,
    pub brittleness: f32,
    pub planarity: f32,
    pub order: f32,
    pub impurity: f32,
    pub integrity: f32,
}

impl Material {
    fn random(kind: ObjectKind, rng: &mut dyn RngCore) -> Self {
        let (hardness, roughness) = match kind {
            ObjectKind::Abrasive => (rng.random_range(0.6..0.9), rng.random_range(0.7..1.0)),
            ObjectKind::Target => (rng.random_range(0.2..0.7), rng.random_range(0.2..0.6)),
            ObjectKind::Raw | ObjectKind::Fragment => {
                (rng.random_range(0.1..0.95), rng.random_range(0.0..0.8))
            }
        };
        Self {
            mass: rng.random_range(0.1..0.9),
            hardness,
            sharpness: rng.random_range(0.0..0.6),
            roughness,
            temperature: 0.3,
            brittleness: rng.random_range(0.1..0.9),
            planarity: rng.random_range(0.1..0.5),
            order: rng.random_range(0.1..0.5),
            impurity: rng.random_range(0.4..0.9),
            integrity: 1.0,
        }
    }

    #[must_use]
    pub fn metric(&self, metric: Metric) -> f32 {
        match metric {
            Metric::SurfacePlanarity => self.planarity,
            Metric::MicrostructureOrder => self.order,
            Metric::ImpurityLevel => self.impurity,
        }
    }

    fn clamp(&mut self) {
        for value in [
            &mut self.mass,
            &mut self.hardness,
            &mut self.sharpness,
            &mut self.roughness,
            &mut self.temperature,
            &mut self.brittleness,
            &mut self.planarity,
            &mut self.order,
            &mut self.impurity,
        ] {
            *value = value.clamp(0.0, 1.0);
        }
        self.integrity = self.integrity.min(1.0);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorldObject {
    kind: ObjectKind,
    position: Position,
    material: Material,
    geometry: f32,
    anchored: bool,
    held_by: Option<AgentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AgentBody {
    position: Position,
    held: Option<ObjectId>,
    energy: f32,
}

/// Slot-map backed sandbox world implementing [`Environment`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxWorld {
    config: SandboxConfig,
    objects: SlotMap<ObjectId, WorldObject>,
    agents: SlotMap<AgentId, AgentBody>,
    last_outcome: Option<Outcome>,
    interactions: u64,
}

impl SandboxWorld {
    /// Empty world with no agents or objects.
    #[must_use]
    pub fn empty(config: SandboxConfig) -> Self {
        Self {
            config,
            objects: SlotMap::with_key(),
            agents: SlotMap::with_key(),
            last_outcome: None,
            interactions: 0,
        }
    }

    /// Populate a world from configuration using the run's random stream.
    #[must_use]
    pub fn generate(config: SandboxConfig, rng: &mut dyn RngCore) -> Self {
        let mut world = Self::empty(config);
        for _ in 0..world.config.agents {
            let position = world.random_position(rng);
            world.spawn_agent(position);
        }
        let batches = [
            (ObjectKind::Raw, world.config.initial_raw),
            (ObjectKind::Target, world.config.initial_targets),
            (ObjectKind::Abrasive, world.config.initial_abrasives),
        ];
        for (kind, count) in batches {
            for _ in 0..count {
                world.spawn_random(kind, rng);
            }
        }
        world
    }

    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Total interactions applied since creation.
    #[must_use]
    pub const fn interactions(&self) -> u64 {
        self.interactions
    }

    pub fn spawn_agent(&mut self, position: Position) -> AgentId {
        let energy = self.config.max_energy;
        self.agents.insert(AgentBody {
            position,
            held: None,
            energy,
        })
    }

    pub fn spawn_object(
        &mut self,
        kind: ObjectKind,
        position: Position,
        material: Material,
        geometry: f32,
    ) -> ObjectId {
        self.objects.insert(WorldObject {
            kind,
            position,
            material,
            geometry: geometry.clamp(0.0, 1.0),
            anchored: false,
            held_by: None,
        })
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        let Some(object) = self.objects.remove(id) else {
            return false;
        };
        if let Some(holder) = object.held_by
            && let Some(agent) = self.agents.get_mut(holder)
        {
            agent.held = None;
        }
        true
    }

    #[must_use]
    pub fn material(&self, id: ObjectId) -> Option<&Material> {
        self.objects.get(id).map(|object| &object.material)
    }

    /// Set an agent's energy directly (clamped to the budget).
    pub fn set_energy(&mut self, agent: AgentId, energy: f32) {
        let max = self.config.max_energy;
        if let Some(body) = self.agents.get_mut(agent) {
            body.energy = energy.clamp(0.0, max);
        }
    }

    fn random_position(&self, rng: &mut dyn RngCore) -> Position {
        Position::new(
            rng.random_range(0.0..self.config.world_width),
            rng.random_range(0.0..self.config.world_height),
        )
    }

    fn spawn_random(&mut self, kind: ObjectKind, rng: &mut dyn RngCore) -> ObjectId {
        let position = self.random_position(rng);
        let material = Material::random(kind, rng);
        let geometry = rng.random_range(0.0..1.0);
        self.spawn_object(kind, position, material, geometry)
    }

    fn jitter(&self, rng: &mut dyn RngCore) -> f32 {
        let amount = self.config.fragment_jitter;
        if amount > 0.0 {
            rng.random_range(-amount..amount)
        } else {
            0.0
        }
    }

    fn view(&self, id: ObjectId, object: &WorldObject) -> ObjectView {
        let m = &object.material;
        ObjectView {
            id,
            kind: object.kind,
            position: object.position,
            properties: [m.mass, m.hardness, m.sharpness, m.roughness, m.temperature],
            geometry: object.geometry,
            anchored: object.anchored,
        }
    }

    fn nearest(
        &self,
        from: Position,
        filter: impl Fn(ObjectId, &WorldObject) -> bool,
    ) -> Option<ObjectId> {
        self.objects
            .iter()
            .filter(|(id, object)| filter(*id, object))
            .min_by_key(|(_, object)| OrderedFloat(object.position.distance(from)))
            .map(|(id, _)| id)
    }

    fn break_apart(&mut self, target: ObjectId, rng: &mut dyn RngCore) -> usize {
        let Some(object) = self.objects.get(target) else {
            return 0;
        };
        let material = object.material;
        let origin = object.position;
        let count = 1 + (material.brittleness * 3.0) as usize;
        self.remove_object(target);
        for _ in 0..count {
            let mut shard = material;
            shard.mass = (material.mass / count as f32).max(0.02);
            shard.sharpness = (0.7 + self.jitter(rng)).clamp(0.0, 1.0);
            shard.integrity = 0.5;
            let position = Position::new(
                origin.x + self.jitter(rng) * 40.0,
                origin.y + self.jitter(rng) * 40.0,
            );
            self.spawn_object(ObjectKind::Fragment, position, shard, 0.8);
        }
        count
    }

    fn strike(
        &mut self,
        tool: ObjectId,
        target: ObjectId,
        intensity: f32,
        rng: &mut dyn RngCore,
    ) -> Option<Outcome> {
        if tool == target {
            return None;
        }
        let tool_material = self.objects.get(tool)?.material;
        let target_material = self.objects.get(target)?.material;

        let force = tool_material.mass
            * (0.5 + 0.5 * tool_material.hardness)
            * (0.6 + 0.4 * tool_material.sharpness)
            * intensity;
        let damage = (force - 0.25 * target_material.hardness + self.jitter(rng)).clamp(0.0, 1.0);
        let wear = (0.5 * target_material.hardness * (1.0 - 0.6 * tool_material.hardness))
            .clamp(0.0, 1.0);

        let mut property_changes = 0.0;
        if let Some(object) = self.objects.get_mut(tool) {
            let before = object.material.sharpness;
            object.material.sharpness -= 0.1 * wear;
            object.material.integrity -= 0.2 * wear;
            object.material.clamp();
            property_changes += (before - object.material.sharpness).abs();
        }
        let mut fragments = 0.0;
        let broken = match self.objects.get_mut(target) {
            Some(object) => {
                object.material.integrity -= damage;
                object.material.integrity <= 0.0
            }
            None => false,
        };
        if broken {
            fragments = self.break_apart(target, rng) as f32 * 0.25;
        } else if damage > 0.3 && target_material.brittleness > 0.6 {
            let mut chip = target_material;
            chip.mass = (chip.mass * 0.1).max(0.02);
            chip.integrity = 0.5;
            let origin = self.objects.get(target).map(|o| o.position).unwrap_or_default();
            self.spawn_object(ObjectKind::Fragment, origin, chip, 0.7);
            fragments = 0.25;
        }
        if self
            .objects
            .get(tool)
            .is_some_and(|object| object.material.integrity <= 0.0)
        {
            self.remove_object(tool);
        }
        Some(Outcome::new(damage, wear, fragments, property_changes))
    }

    fn bind(&mut self, tool: ObjectId, partner: ObjectId) -> Option<Outcome> {
        if tool == partner {
            return None;
        }
        let partner_object = self.objects.get(partner)?;
        if partner_object.anchored {
            return Some(Outcome::ZERO);
        }
        let partner_material = partner_object.material;
        let partner_geometry = partner_object.geometry;
        let object = self.objects.get_mut(tool)?;
        let before_mass = object.material.mass;
        object.material.mass += 0.5 * partner_material.mass;
        object.geometry = ((object.geometry + partner_geometry) * 0.5 + 0.1).clamp(0.0, 1.0);
        object.material.clamp();
        let property_changes =
            (object.material.mass - before_mass).abs() + 0.2 * partner_material.roughness;
        self.remove_object(partner);
        Some(Outcome::new(0.0, 0.05, 0.0, property_changes))
    }

    fn process(
        &mut self,
        verb: Verb,
        workpiece: ObjectId,
        counterpart: Option<ObjectId>,
        intensity: f32,
    ) -> Option<Outcome> {
        let counterpart = counterpart.filter(|id| *id != workpiece);
        let counterpart_material = counterpart.and_then(|id| self.objects.get(id).map(|o| o.material));
        let object = self.objects.get_mut(workpiece)?;
        let m = &mut object.material;
        let (changed, wear, dust) = match verb {
            Verb::Grind => {
                let abrasiveness = counterpart_material.map_or(0.3, |c| 0.4 + 0.6 * c.roughness);
                let before = (m.planarity, m.sharpness);
                m.planarity += (intensity - m.planarity) * 0.7 * abrasiveness;
                m.sharpness += 0.05 * intensity * abrasiveness;
                m.clamp();
                let changed = (m.planarity - before.0).abs() + (m.sharpness - before.1).abs();
                (changed, 0.05 + 0.1 * m.hardness * intensity, 0.02 * intensity)
            }
            Verb::Heat => {
                let before = m.order;
                m.order += (intensity - m.order) * 0.6;
                m.temperature = 0.5 * m.temperature + 0.5 * intensity;
                m.clamp();
                ((m.order - before).abs(), 0.0, 0.0)
            }
            Verb::Soak => {
                let before = m.impurity;
                m.impurity += ((1.0 - intensity) - m.impurity) * 0.6;
                m.temperature *= 0.8;
                m.clamp();
                ((m.impurity - before).abs(), 0.0, 0.0)
            }
            _ => return None,
        };
        if verb == Verb::Grind
            && let Some(id) = counterpart
            && let Some(abrasive) = self.objects.get_mut(id)
            && abrasive.kind == ObjectKind::Abrasive
        {
            abrasive.material.integrity -= 0.1 * intensity;
            if abrasive.material.integrity <= 0.0 {
                self.remove_object(id);
            }
        }
        Some(Outcome::new(0.0, wear, dust, changed))
    }
}

impl Environment for SandboxWorld {
    fn agents(&self) -> Vec<AgentId> {
        self.agents.keys().collect()
    }

    fn agent(&self, id: AgentId) -> Option<AgentView> {
        self.agents.get(id).map(|body| AgentView {
            id,
            position: body.position,
            held: body.held,
            energy: body.energy,
        })
    }

    fn object(&self, id: ObjectId) -> Option<ObjectView> {
        self.objects.get(id).map(|object| self.view(id, object))
    }

    fn nearby_objects(&self, agent: AgentId, limit: usize) -> Vec<ObjectId> {
        let Some(body) = self.agents.get(agent) else {
            return Vec::new();
        };
        let mut candidates: Vec<(ObjectId, f32)> = self
            .objects
            .iter()
            .filter(|(_, object)| object.held_by.is_none())
            .map(|(id, object)| (id, object.position.distance(body.position)))
            .collect();
        candidates.sort_by_key(|(_, distance)| OrderedFloat(*distance));
        candidates.into_iter().take(limit).map(|(id, _)| id).collect()
    }

    fn best_target(&self, agent: AgentId) -> Option<ObjectId> {
        let body = self.agents.get(agent)?;
        self.nearest(body.position, |_, object| {
            object.kind == ObjectKind::Target && object.held_by.is_none() && !object.anchored
        })
    }

    fn consumable_for(&self, object: ObjectId, metric: Metric) -> Option<ObjectId> {
        if !metric.requires_consumable() {
            return None;
        }
        let origin = self.objects.get(object)?.position;
        self.nearest(origin, |id, candidate| {
            id != object
                && candidate.kind == ObjectKind::Abrasive
                && candidate.held_by.is_none()
                && !candidate.anchored
        })
    }

    fn replenish(&mut self, agent: AgentId, amount: f32) {
        let max = self.config.max_energy;
        if let Some(body) = self.agents.get_mut(agent) {
            body.energy = (body.energy + amount.max(0.0)).min(max);
        }
    }

    fn apply_pressure(
        &mut self,
        directive: &PopulationDirective,
        rng: &mut dyn RngCore,
    ) -> PressureReport {
        let mut report = PressureReport::default();
        let chance = (directive.spawn_probability * self.config.spawn_rate).clamp(0.0, 1.0);
        if chance > 0.0 && rng.random::<f32>() < chance {
            self.spawn_random(ObjectKind::Target, rng);
            report.spawned = 1;
        }
        if directive.debris_to_clean > 0 {
            let debris: Vec<ObjectId> = self
                .objects
                .iter()
                .filter(|(_, object)| {
                    object.kind == ObjectKind::Fragment
                        && object.held_by.is_none()
                        && !object.anchored
                })
                .map(|(id, _)| id)
                .take(directive.debris_to_clean)
                .collect();
            for id in debris {
                if self.remove_object(id) {
                    report.cleaned += 1;
                }
            }
        }
        report
    }

    fn apply(&mut self, action: &Action, rng: &mut dyn RngCore) -> ApplyStatus {
        self.last_outcome = None;
        let agent_id = action.agent;
        let Some(body) = self.agents.get(agent_id) else {
            return ApplyStatus::Unresolved;
        };
        let agent_position = body.position;
        let previously_held = body.held;
        let intensity = action.intensity.clamp(0.0, 1.0);

        let outcome = match action.verb {
            Verb::Rest => {
                let gain = self.config.rest_energy_gain;
                self.replenish(agent_id, gain);
                return ApplyStatus::Applied;
            }
            Verb::Control => None,
            Verb::PickUp => {
                let Some(id) = action.object else {
                    return ApplyStatus::Unresolved;
                };
                let Some(object) = self.objects.get(id) else {
                    return ApplyStatus::Unresolved;
                };
                if object.anchored || object.held_by.is_some_and(|holder| holder != agent_id) {
                    return ApplyStatus::Unresolved;
                }
                let position = object.position;
                if let Some(previous) = previously_held
                    && let Some(old) = self.objects.get_mut(previous)
                {
                    old.held_by = None;
                    old.position = agent_position;
                }
                if let Some(object) = self.objects.get_mut(id) {
                    object.held_by = Some(agent_id);
                }
                if let Some(body) = self.agents.get_mut(agent_id) {
                    body.held = Some(id);
                    body.position = position;
                }
                None
            }
            Verb::MoveTo => {
                let Some(destination) = action.object.and_then(|id| self.objects.get(id)) else {
                    return ApplyStatus::Unresolved;
                };
                let to = destination.position;
                if let Some(body) = self.agents.get_mut(agent_id) {
                    body.position = Position::new(
                        body.position.x + (to.x - body.position.x) * 0.5,
                        body.position.y + (to.y - body.position.y) * 0.5,
                    );
                }
                None
            }
            Verb::Drop => {
                if let Some(held) = previously_held
                    && let Some(object) = self.objects.get_mut(held)
                {
                    object.held_by = None;
                    object.position = agent_position;
                }
                if let Some(body) = self.agents.get_mut(agent_id) {
                    body.held = None;
                }
                None
            }
            Verb::StrikeWith => {
                let (Some(tool), Some(target)) = (action.object, action.target) else {
                    return ApplyStatus::Unresolved;
                };
                match self.strike(tool, target, intensity, rng) {
                    Some(outcome) => Some(outcome),
                    None => return ApplyStatus::Unresolved,
                }
            }
            Verb::BindTo => {
                let (Some(tool), Some(partner)) = (action.object, action.target) else {
                    return ApplyStatus::Unresolved;
                };
                match self.bind(tool, partner) {
                    Some(outcome) => Some(outcome),
                    None => return ApplyStatus::Unresolved,
                }
            }
            Verb::Grind | Verb::Heat | Verb::Soak => {
                let Some(workpiece) = action.object else {
                    return ApplyStatus::Unresolved;
                };
                match self.process(action.verb, workpiece, action.target, intensity) {
                    Some(outcome) => Some(outcome),
                    None => return ApplyStatus::Unresolved,
                }
            }
            Verb::Anchor => {
                let Some(id) = action.object else {
                    return ApplyStatus::Unresolved;
                };
                let Some(object) = self.objects.get_mut(id) else {
                    return ApplyStatus::Unresolved;
                };
                object.anchored = true;
                if let Some(holder) = object.held_by.take()
                    && let Some(body) = self.agents.get_mut(holder)
                {
                    object.position = body.position;
                    body.held = None;
                }
                None
            }
        };

        let cost = self.config.action_energy_cost;
        if let Some(body) = self.agents.get_mut(agent_id) {
            body.energy = (body.energy - cost).max(0.0);
        }
        if outcome.is_some() {
            self.interactions += 1;
        }
        self.last_outcome = outcome;
        ApplyStatus::Applied
    }

    fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    fn measure(
        &mut self,
        object: ObjectId,
        metric: Metric,
        instrument: Option<ObjectId>,
        rng: &mut dyn RngCore,
    ) -> Option<Measurement> {
        let value = self.objects.get(object)?.material.metric(metric);
        let instrumented = instrument.is_some_and(|id| self.objects.contains_key(id));
        let (sigma, samples) = if instrumented {
            (self.config.measurement_sigma * 0.5, 3)
        } else {
            (self.config.measurement_sigma, 1)
        };
        let mut reading = value;
        if sigma > 0.0 {
            let noise: f32 = (0..samples)
                .map(|_| rng.random_range(-sigma..sigma))
                .sum::<f32>()
                / samples as f32;
            reading += noise;
        }
        Some(Measurement {
            value: reading.clamp(0.0, 1.0),
            sigma,
            sample_count: samples,
        })
    }

    fn population(&self) -> PopulationCounts {
        let mut counts = PopulationCounts {
            objects_total: self.objects.len(),
            ..PopulationCounts::default()
        };
        for object in self.objects.values() {
            match object.kind {
                ObjectKind::Target => counts.targets_alive += 1,
                ObjectKind::Fragment => counts.fragments_total += 1,
                ObjectKind::Raw | ObjectKind::Abrasive => {}
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimRng;

    fn material(hardness: f32) -> Material {
        Material {
            mass: 0.8,
            hardness,
            sharpness: 0.5,
            roughness: 0.5,
            temperature: 0.3,
            brittleness: 0.9,
            planarity: 0.2,
            order: 0.2,
            impurity: 0.8,
            integrity: 1.0,
        }
    }

    fn quiet_config() -> SandboxConfig {
        SandboxConfig {
            agents: 0,
            initial_raw: 0,
            initial_targets: 0,
            initial_abrasives: 0,
            measurement_sigma: 0.0,
            fragment_jitter: 0.0,
            ..SandboxConfig::default()
        }
    }

    #[test]
    fn generation_is_seeded() {
        let config = SandboxConfig::default();
        let world_a = SandboxWorld::generate(config.clone(), &mut SimRng::seed_from_u64(9));
        let world_b = SandboxWorld::generate(config.clone(), &mut SimRng::seed_from_u64(9));
        assert_eq!(world_a.population(), world_b.population());
        assert_eq!(world_a.agents().len(), config.agents);
        let ids: Vec<_> = world_a.objects.keys().collect();
        for id in ids {
            assert_eq!(world_a.object(id), world_b.object(id));
        }
    }

    #[test]
    fn pick_up_then_strike_breaks_target() {
        let mut world = SandboxWorld::empty(quiet_config());
        let mut rng = SimRng::seed_from_u64(1);
        let agent = world.spawn_agent(Position::new(0.0, 0.0));
        let tool = world.spawn_object(ObjectKind::Raw, Position::new(1.0, 0.0), material(0.9), 0.5);
        let target =
            world.spawn_object(ObjectKind::Target, Position::new(2.0, 0.0), material(0.1), 0.5);

        let pick = Action::new(agent, Verb::PickUp, Some(tool), None);
        assert_eq!(world.apply(&pick, &mut rng), ApplyStatus::Applied);
        assert_eq!(world.agent(agent).and_then(|a| a.held), Some(tool));
        assert!(world.last_outcome().is_none());

        let strike = Action::new(agent, Verb::StrikeWith, Some(tool), Some(target));
        let mut broke = false;
        for _ in 0..6 {
            if world.apply(&strike, &mut rng) == ApplyStatus::Unresolved {
                broke = true;
                break;
            }
            let outcome = world.last_outcome().expect("strike outcome");
            assert!(outcome.damage > 0.0);
        }
        assert!(broke, "target should eventually break and stop resolving");
        assert!(world.population().fragments_total > 0);
        assert_eq!(world.population().targets_alive, 0);
    }

    #[test]
    fn unresolved_references_are_no_ops() {
        let mut world = SandboxWorld::empty(quiet_config());
        let mut rng = SimRng::seed_from_u64(2);
        let agent = world.spawn_agent(Position::default());
        let ghost = world.spawn_object(ObjectKind::Raw, Position::default(), material(0.5), 0.5);
        world.remove_object(ghost);
        let energy = world.agent(agent).expect("agent").energy;
        let action = Action::new(agent, Verb::PickUp, Some(ghost), None);
        assert_eq!(world.apply(&action, &mut rng), ApplyStatus::Unresolved);
        assert_eq!(world.agent(agent).expect("agent").energy, energy);
        assert!(world.last_outcome().is_none());
    }

    #[test]
    fn cleanup_only_removes_fragments() {
        let mut world = SandboxWorld::empty(quiet_config());
        let mut rng = SimRng::seed_from_u64(3);
        for _ in 0..3 {
            world.spawn_object(ObjectKind::Fragment, Position::default(), material(0.2), 0.5);
        }
        world.spawn_object(ObjectKind::Target, Position::default(), material(0.2), 0.5);
        world.spawn_object(ObjectKind::Raw, Position::default(), material(0.2), 0.5);
        let directive = PopulationDirective {
            spawn_probability: 0.0,
            debris_to_clean: 10,
        };
        let report = world.apply_pressure(&directive, &mut rng);
        assert_eq!(report.cleaned, 3);
        assert_eq!(report.spawned, 0);
        let counts = world.population();
        assert_eq!(counts.fragments_total, 0);
        assert_eq!(counts.objects_total, 2);
        assert_eq!(counts.targets_alive, 1);
    }

    #[test]
    fn grinding_consumes_abrasive_and_moves_planarity() {
        let mut world = SandboxWorld::empty(quiet_config());
        let mut rng = SimRng::seed_from_u64(4);
        let agent = world.spawn_agent(Position::default());
        let piece = world.spawn_object(ObjectKind::Raw, Position::default(), material(0.5), 0.5);
        let abrasive =
            world.spawn_object(ObjectKind::Abrasive, Position::new(3.0, 0.0), material(0.8), 0.5);
        assert_eq!(
            world.consumable_for(piece, Metric::SurfacePlanarity),
            Some(abrasive)
        );
        assert_eq!(world.consumable_for(piece, Metric::MicrostructureOrder), None);

        let before = world.material(piece).expect("piece").planarity;
        let grind = Action::new(agent, Verb::Grind, Some(piece), Some(abrasive)).with_intensity(0.9);
        assert_eq!(world.apply(&grind, &mut rng), ApplyStatus::Applied);
        let after = world.material(piece).expect("piece").planarity;
        assert!(after > before);
        assert!(world.material(abrasive).expect("abrasive").integrity < 1.0);

        let reading = world
            .measure(piece, Metric::SurfacePlanarity, None, &mut rng)
            .expect("measurement");
        assert_eq!(reading.value, after);
        assert_eq!(reading.sample_count, 1);
    }

    #[test]
    fn anchoring_releases_the_held_object() {
        let mut world = SandboxWorld::empty(quiet_config());
        let mut rng = SimRng::seed_from_u64(5);
        let agent = world.spawn_agent(Position::default());
        let piece = world.spawn_object(ObjectKind::Raw, Position::default(), material(0.5), 0.5);
        world.apply(&Action::new(agent, Verb::PickUp, Some(piece), None), &mut rng);
        world.apply(&Action::new(agent, Verb::Anchor, Some(piece), None), &mut rng);
        assert!(world.object(piece).expect("piece").anchored);
        assert_eq!(world.agent(agent).expect("agent").held, None);
        let repick = Action::new(agent, Verb::PickUp, Some(piece), None);
        assert_eq!(world.apply(&repick, &mut rng), ApplyStatus::Unresolved);
    }

    #[test]
    fn anchored_objects_are_never_consumed() {
        let mut world = SandboxWorld::empty(quiet_config());
        let mut rng = SimRng::seed_from_u64(6);
        let agent = world.spawn_agent(Position::default());
        let pinned_target =
            world.spawn_object(ObjectKind::Target, Position::new(1.0, 0.0), material(0.2), 0.5);
        let free_target =
            world.spawn_object(ObjectKind::Target, Position::new(5.0, 0.0), material(0.2), 0.5);
        let piece = world.spawn_object(ObjectKind::Raw, Position::default(), material(0.5), 0.5);
        let pinned_abrasive =
            world.spawn_object(ObjectKind::Abrasive, Position::new(1.0, 0.0), material(0.8), 0.5);
        let free_abrasive =
            world.spawn_object(ObjectKind::Abrasive, Position::new(6.0, 0.0), material(0.8), 0.5);
        let pinned_fragment =
            world.spawn_object(ObjectKind::Fragment, Position::default(), material(0.2), 0.5);
        world.spawn_object(ObjectKind::Fragment, Position::default(), material(0.2), 0.5);
        for id in [pinned_target, pinned_abrasive, pinned_fragment] {
            world.apply(&Action::new(agent, Verb::Anchor, Some(id), None), &mut rng);
        }

        assert_eq!(world.best_target(agent), Some(free_target));
        assert_eq!(
            world.consumable_for(piece, Metric::SurfacePlanarity),
            Some(free_abrasive)
        );
        let directive = PopulationDirective {
            spawn_probability: 0.0,
            debris_to_clean: 10,
        };
        assert_eq!(world.apply_pressure(&directive, &mut rng).cleaned, 1);
        assert!(world.object(pinned_fragment).is_some_and(|view| view.anchored));
    }
}
