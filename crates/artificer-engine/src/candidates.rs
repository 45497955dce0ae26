//! Per-tick candidate generation and scoring.

use artificer_core::{
    Action, AgentView, ArtificerConfig, Environment, FeatureInput, ObjectId, ObjectKind, Outcome,
    Perception, Regime, Verb,
};
use artificer_learn::OutcomeModel;
use ordered_float::OrderedFloat;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Distance at which the relative-position feature saturates.
const RELATIVE_RANGE: f32 = 200.0;
/// Strike utility multiplier while manufacturing.
const MANUFACTURE_STRIKE_SCALE: f32 = 0.45;

/// Short-horizon repeat key: a verb applied to a particular object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecentKey {
    pub verb: Verb,
    pub object: Option<ObjectId>,
}

impl RecentKey {
    #[must_use]
    pub fn of(action: &Action) -> Self {
        Self {
            verb: action.verb,
            object: action.target.or(action.object),
        }
    }
}

/// Bounded window of recent decisions for one agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecentWindow {
    keys: VecDeque<RecentKey>,
}

impl RecentWindow {
    pub fn push(&mut self, key: RecentKey, capacity: usize) {
        while self.keys.len() >= capacity.max(1) {
            self.keys.pop_front();
        }
        self.keys.push_back(key);
    }

    #[must_use]
    pub fn seen(&self, key: &RecentKey) -> usize {
        self.keys.iter().filter(|recent| *recent == key).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A proposed action, rebuilt every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub action: Action,
    pub input: Option<FeatureInput>,
    pub prediction: Option<Outcome>,
    /// Perception-derived prior, used as the score when there is no model input.
    pub prior: f32,
    pub score: f32,
}

impl Candidate {
    fn plain(action: Action, prior: f32) -> Self {
        Self {
            action,
            input: None,
            prediction: None,
            prior,
            score: 0.0,
        }
    }

    fn interaction(action: Action, input: FeatureInput) -> Self {
        Self {
            action,
            input: Some(input),
            prediction: None,
            prior: 0.0,
            score: 0.0,
        }
    }
}

fn relative(agent: &AgentView, position: artificer_core::Position) -> f32 {
    (agent.position.distance(position) / RELATIVE_RANGE).min(1.0)
}

/// Build the candidate set for `agent`.
///
/// Empty-handed agents get PICK_UP candidates ranked by desirability plus a MOVE_TO toward
/// the best target; holding agents get STRIKE_WITH, BIND_TO, GRIND and DROP. Anchored
/// objects never appear as pickups or partners.
pub fn build<E, P>(
    env: &E,
    perception: &P,
    agent: &AgentView,
    config: &ArtificerConfig,
    rng: &mut dyn RngCore,
) -> Vec<Candidate>
where
    E: Environment + ?Sized,
    P: Perception + ?Sized,
{
    let mut candidates = Vec::new();
    let held = agent.held.and_then(|id| env.object(id));

    let Some(tool) = held else {
        let mut ranked: Vec<(ObjectId, f32)> = env
            .nearby_objects(agent.id, config.pickup_candidates * 4)
            .into_iter()
            .filter_map(|id| env.object(id))
            .filter(|view| !view.anchored)
            .map(|view| {
                let observation = perception.observe(&view, rng);
                (view.id, perception.predict(&observation).desirability())
            })
            .collect();
        ranked.sort_by_key(|(_, desirability)| std::cmp::Reverse(OrderedFloat(*desirability)));
        candidates.extend(
            ranked
                .into_iter()
                .take(config.pickup_candidates)
                .map(|(id, desirability)| {
                    Candidate::plain(Action::new(agent.id, Verb::PickUp, Some(id), None), desirability)
                }),
        );
        if let Some(target) = env.best_target(agent.id) {
            candidates.push(Candidate::plain(
                Action::new(agent.id, Verb::MoveTo, Some(target), None),
                0.0,
            ));
        }
        return candidates;
    };

    let tool_obs = perception.observe(&tool, rng);
    let geometry = tool_obs.geometry;
    if let Some(target) = env.best_target(agent.id).and_then(|id| env.object(id)) {
        let target_obs = perception.observe(&target, rng);
        let input = FeatureInput::new(
            &tool_obs,
            &target_obs,
            geometry,
            relative(agent, target.position),
            Verb::StrikeWith,
        );
        candidates.push(Candidate::interaction(
            Action::new(agent.id, Verb::StrikeWith, Some(tool.id), Some(target.id)),
            input,
        ));
    }
    // Anchored objects are never consumed or bound.
    for neighbor in env
        .nearby_objects(agent.id, usize::MAX)
        .into_iter()
        .filter(|id| *id != tool.id)
        .filter_map(|id| env.object(id))
        .filter(|view| !view.anchored)
        .take(config.neighbor_candidates)
    {
        let neighbor_obs = perception.observe(&neighbor, rng);
        let rel = relative(agent, neighbor.position);
        if neighbor.kind != ObjectKind::Abrasive {
            let input = FeatureInput::new(&tool_obs, &neighbor_obs, geometry, rel, Verb::BindTo);
            candidates.push(Candidate::interaction(
                Action::new(agent.id, Verb::BindTo, Some(tool.id), Some(neighbor.id)),
                input,
            ));
        }
        let input = FeatureInput::new(&tool_obs, &neighbor_obs, geometry, rel, Verb::Grind);
        candidates.push(Candidate::interaction(
            Action::new(agent.id, Verb::Grind, Some(tool.id), Some(neighbor.id)),
            input,
        ));
    }
    candidates.push(Candidate::plain(
        Action::new(agent.id, Verb::Drop, Some(tool.id), None),
        0.0,
    ));
    candidates
}

/// Score candidates in place: `curiosity + utility` for model-backed candidates, the
/// prior otherwise.
pub fn score(
    candidates: &mut [Candidate],
    model: &OutcomeModel,
    recent: &RecentWindow,
    regime: Regime,
) {
    for candidate in candidates.iter_mut() {
        let Some(input) = candidate.input else {
            candidate.score = candidate.prior;
            continue;
        };
        let prediction = model.predict(&input);
        let seen = recent.seen(&RecentKey::of(&candidate.action)) as f32;
        let curiosity = model.novelty(&input) * (1.0 - seen * 0.15).max(0.2);
        let mut utility = prediction.utility();
        if regime == Regime::Manufacture && candidate.action.verb == Verb::StrikeWith {
            utility *= MANUFACTURE_STRIKE_SCALE;
        }
        candidate.prediction = Some(prediction);
        candidate.score = curiosity + utility;
    }
}

/// Index of the highest score; the earliest candidate wins ties.
#[must_use]
pub fn best(candidates: &[Candidate]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        match best {
            Some((_, score)) if candidate.score <= score => {}
            _ => best = Some((idx, candidate.score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Shannon entropy of the softmax over candidate scores.
#[must_use]
pub fn entropy(candidates: &[Candidate]) -> f32 {
    let Some(max) = candidates
        .iter()
        .map(|candidate| candidate.score)
        .filter(|score| score.is_finite())
        .max_by_key(|score| OrderedFloat(*score))
    else {
        return 0.0;
    };
    let exps: Vec<f32> = candidates
        .iter()
        .map(|candidate| {
            if candidate.score.is_finite() {
                (candidate.score - max).exp()
            } else {
                0.0
            }
        })
        .collect();
    let total: f32 = exps.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    -exps
        .iter()
        .map(|value| value / total)
        .filter(|p| *p > 0.0)
        .map(|p| p * p.ln())
        .sum::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use artificer_core::{
        AgentId, ApplyStatus, LinearPerception, Measurement, Metric, ObjectView, Observation,
        PopulationCounts, PopulationDirective, Position, PressureReport, SimRng,
    };
    use slotmap::SlotMap;

    fn ids() -> (AgentId, Vec<ObjectId>) {
        let mut agents: SlotMap<AgentId, ()> = SlotMap::with_key();
        let mut objects: SlotMap<ObjectId, ()> = SlotMap::with_key();
        (agents.insert(()), (0..4).map(|_| objects.insert(())).collect())
    }

    /// Static bench: objects are listed nearest first, the held one excluded from `nearby`.
    struct Bench {
        agent: AgentView,
        objects: Vec<ObjectView>,
    }

    impl Bench {
        fn new(layout: &[(ObjectKind, f32, bool)], held: Option<usize>) -> Self {
            let mut agents: SlotMap<AgentId, ()> = SlotMap::with_key();
            let mut keys: SlotMap<ObjectId, ()> = SlotMap::with_key();
            let objects: Vec<ObjectView> = layout
                .iter()
                .enumerate()
                .map(|(idx, (kind, mass, anchored))| ObjectView {
                    id: keys.insert(()),
                    kind: *kind,
                    position: Position::new(10.0 * (idx as f32 + 1.0), 0.0),
                    properties: [*mass, 0.0, 0.0, 0.0, 0.0],
                    geometry: 0.5,
                    anchored: *anchored,
                })
                .collect();
            let agent = AgentView {
                id: agents.insert(()),
                position: Position::new(0.0, 0.0),
                held: held.map(|idx| objects[idx].id),
                energy: 1.0,
            };
            Self { agent, objects }
        }

        fn id(&self, idx: usize) -> ObjectId {
            self.objects[idx].id
        }

        fn build(&self) -> Vec<Candidate> {
            let mut rng = SimRng::seed_from_u64(3);
            build(
                self,
                &LinearPerception::new(0.0),
                &self.agent,
                &ArtificerConfig::default(),
                &mut rng,
            )
        }
    }

    impl Environment for Bench {
        fn agents(&self) -> Vec<AgentId> {
            vec![self.agent.id]
        }
        fn agent(&self, id: AgentId) -> Option<AgentView> {
            (id == self.agent.id).then_some(self.agent)
        }
        fn object(&self, id: ObjectId) -> Option<ObjectView> {
            self.objects.iter().find(|view| view.id == id).copied()
        }
        fn nearby_objects(&self, _: AgentId, limit: usize) -> Vec<ObjectId> {
            self.objects
                .iter()
                .map(|view| view.id)
                .filter(|id| Some(*id) != self.agent.held)
                .take(limit)
                .collect()
        }
        fn best_target(&self, _: AgentId) -> Option<ObjectId> {
            self.objects
                .iter()
                .find(|view| view.kind == ObjectKind::Target && !view.anchored)
                .map(|view| view.id)
        }
        fn consumable_for(&self, _: ObjectId, _: Metric) -> Option<ObjectId> {
            None
        }
        fn replenish(&mut self, _: AgentId, _: f32) {}
        fn apply_pressure(&mut self, _: &PopulationDirective, _: &mut dyn RngCore) -> PressureReport {
            PressureReport::default()
        }
        fn apply(&mut self, _: &Action, _: &mut dyn RngCore) -> ApplyStatus {
            ApplyStatus::Unresolved
        }
        fn last_outcome(&self) -> Option<Outcome> {
            None
        }
        fn measure(
            &mut self,
            _: ObjectId,
            _: Metric,
            _: Option<ObjectId>,
            _: &mut dyn RngCore,
        ) -> Option<Measurement> {
            None
        }
        fn population(&self) -> PopulationCounts {
            PopulationCounts::default()
        }
    }

    fn shape(candidates: &[Candidate]) -> Vec<(Verb, Option<ObjectId>, Option<ObjectId>)> {
        candidates
            .iter()
            .map(|candidate| (candidate.action.verb, candidate.action.object, candidate.action.target))
            .collect()
    }

    #[test]
    fn empty_hand_offers_most_desirable_pickups() {
        let bench = Bench::new(
            &[
                (ObjectKind::Raw, 0.1, false),
                (ObjectKind::Raw, 0.9, false),
                (ObjectKind::Raw, 1.0, true),
                (ObjectKind::Target, 0.2, false),
                (ObjectKind::Raw, 0.5, false),
                (ObjectKind::Abrasive, 0.7, false),
            ],
            None,
        );
        let candidates = bench.build();
        assert_eq!(
            shape(&candidates),
            vec![
                (Verb::PickUp, Some(bench.id(1)), None),
                (Verb::PickUp, Some(bench.id(5)), None),
                (Verb::PickUp, Some(bench.id(4)), None),
                (Verb::MoveTo, Some(bench.id(3)), None),
            ]
        );
        assert!(candidates[0].prior > candidates[1].prior);
        assert!(candidates[1].prior > candidates[2].prior);
        assert!(candidates.iter().all(|candidate| candidate.input.is_none()));
    }

    #[test]
    fn held_tool_offers_strike_bind_grind_and_drop() {
        let bench = Bench::new(
            &[
                (ObjectKind::Raw, 0.8, false),
                (ObjectKind::Abrasive, 0.3, false),
                (ObjectKind::Raw, 0.4, false),
                (ObjectKind::Raw, 0.6, false),
                (ObjectKind::Target, 0.2, false),
            ],
            Some(0),
        );
        let tool = Some(bench.id(0));
        let candidates = bench.build();
        assert_eq!(
            shape(&candidates),
            vec![
                (Verb::StrikeWith, tool, Some(bench.id(4))),
                (Verb::Grind, tool, Some(bench.id(1))),
                (Verb::BindTo, tool, Some(bench.id(2))),
                (Verb::Grind, tool, Some(bench.id(2))),
                (Verb::Drop, tool, None),
            ]
        );
        assert!(candidates[..4].iter().all(|candidate| candidate.input.is_some()));
        assert!(candidates[4].input.is_none());
    }

    #[test]
    fn anchored_objects_are_never_partners() {
        let bench = Bench::new(
            &[
                (ObjectKind::Raw, 0.8, false),
                (ObjectKind::Raw, 0.5, true),
                (ObjectKind::Abrasive, 0.3, true),
                (ObjectKind::Raw, 0.4, false),
            ],
            Some(0),
        );
        let tool = Some(bench.id(0));
        let candidates = bench.build();
        assert_eq!(
            shape(&candidates),
            vec![
                (Verb::BindTo, tool, Some(bench.id(3))),
                (Verb::Grind, tool, Some(bench.id(3))),
                (Verb::Drop, tool, None),
            ]
        );
    }

    fn strike(agent: AgentId, tool: ObjectId, target: ObjectId, mass: f32) -> Candidate {
        let tool_obs = Observation::new([mass, 0.8, 0.6, 0.2, 0.3], 0.5);
        let target_obs = Observation::new([0.4, 0.2, 0.1, 0.5, 0.3], 0.5);
        Candidate::interaction(
            Action::new(agent, Verb::StrikeWith, Some(tool), Some(target)),
            FeatureInput::new(&tool_obs, &target_obs, 0.5, 0.1, Verb::StrikeWith),
        )
    }

    #[test]
    fn unseen_inputs_score_full_curiosity() {
        let (agent, objects) = ids();
        let model = OutcomeModel::new();
        let mut candidates = vec![
            Candidate::plain(Action::new(agent, Verb::PickUp, Some(objects[0]), None), 0.7),
            strike(agent, objects[1], objects[2], 0.9),
        ];
        score(&mut candidates, &model, &RecentWindow::default(), Regime::Explore);
        assert_eq!(candidates[0].score, 0.7);
        assert_eq!(candidates[1].score, 1.0);
        assert_eq!(candidates[1].prediction, Some(Outcome::ZERO));
        assert_eq!(best(&candidates), Some(1));
    }

    #[test]
    fn recent_repeats_decay_curiosity_to_floor() {
        let (agent, objects) = ids();
        let model = OutcomeModel::new();
        let mut recent = RecentWindow::default();
        let candidate = strike(agent, objects[1], objects[2], 0.9);
        for _ in 0..10 {
            recent.push(RecentKey::of(&candidate.action), 20);
        }
        let mut candidates = vec![candidate];
        score(&mut candidates, &model, &recent, Regime::Explore);
        assert!((candidates[0].score - 0.2).abs() < 1e-6);

        let mut window = RecentWindow::default();
        for _ in 0..30 {
            window.push(RecentKey::of(&candidates[0].action), 20);
        }
        assert_eq!(window.len(), 20);
    }

    #[test]
    fn manufacture_discounts_strike_utility() {
        let (agent, objects) = ids();
        let mut model = OutcomeModel::new();
        let candidate = strike(agent, objects[1], objects[2], 0.9);
        let input = candidate.input.expect("input");
        for _ in 0..50 {
            model.update(&input, &Outcome::new(0.9, 0.0, 0.5, 0.0), 0.05);
        }
        let mut explore = vec![candidate.clone()];
        let mut manufacture = vec![candidate];
        score(&mut explore, &model, &RecentWindow::default(), Regime::Explore);
        score(&mut manufacture, &model, &RecentWindow::default(), Regime::Manufacture);
        let curiosity = model.novelty(&input);
        let full = explore[0].score - curiosity;
        let scaled = manufacture[0].score - curiosity;
        assert!(full > 0.0);
        assert!((scaled - full * 0.45).abs() < 1e-5);
    }

    #[test]
    fn ties_go_to_the_first_candidate() {
        let (agent, objects) = ids();
        let candidates: Vec<Candidate> = objects
            .iter()
            .map(|id| {
                let mut candidate =
                    Candidate::plain(Action::new(agent, Verb::PickUp, Some(*id), None), 0.0);
                candidate.score = 0.5;
                candidate
            })
            .collect();
        assert_eq!(best(&candidates), Some(0));
        assert_eq!(best(&[]), None);
    }

    #[test]
    fn entropy_is_maximal_for_uniform_scores() {
        let (agent, objects) = ids();
        let mut candidates: Vec<Candidate> = objects
            .iter()
            .map(|id| Candidate::plain(Action::new(agent, Verb::PickUp, Some(*id), None), 0.0))
            .collect();
        assert!((entropy(&candidates) - (4.0_f32).ln()).abs() < 1e-5);
        candidates[0].score = 50.0;
        assert!(entropy(&candidates) < 0.01);
        assert_eq!(entropy(&[]), 0.0);
    }
}
