//! The live decision-and-learning loop.
//!
//! [`LiveEngine`] owns every piece of mutable state (model, replay, controllers, the
//! random stream) and advances it one synchronous tick at a time.

pub mod candidates;
pub mod metrics;
pub mod report;
pub mod snapshot;

use artificer_control::{
    ClosedLoopController, ControllerPhase, PopulationController, RegimeMachine, StallDetector,
};
use artificer_core::{
    Action, AgentId, AgentView, ApplyStatus, ArtificerConfig, ConfigError, ControlTarget,
    Environment, FeatureInput, LinearPerception, ObjectId, ObjectKind, Outcome, Perception,
    PopulationDirective, Regime, SandboxWorld, ShapeError, SimRng, Tick, Verb,
};
use artificer_learn::{OutcomeModel, ReplayBuffer, ToolEffectEmbedding, TrainingScheduler, Transition};
use rand::Rng;
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

pub use candidates::{Candidate, RecentKey, RecentWindow};
pub use metrics::{AggregateMetrics, RollingMetrics};
pub use report::{DecisionSource, TickEvent, TickReport};
pub use snapshot::{AgentMemory, EngineSnapshot, EngineState, SNAPSHOT_VERSION};

/// Errors raised while building or restoring an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedSnapshot { found: u32, expected: u32 },
}

/// Chosen action plus what the scorer knew about it.
#[derive(Debug, Clone)]
struct Decision {
    action: Action,
    input: Option<FeatureInput>,
    prediction: Option<Outcome>,
    source: DecisionSource,
    candidates: usize,
    entropy: f32,
}

impl Decision {
    fn rest(agent: AgentId, candidates: usize, entropy: f32) -> Self {
        Self {
            action: Action::rest(agent),
            input: None,
            prediction: None,
            source: DecisionSource::Rest,
            candidates,
            entropy,
        }
    }

    fn forced(action: Action, source: DecisionSource, candidates: usize, entropy: f32) -> Self {
        Self {
            action,
            input: None,
            prediction: None,
            source,
            candidates,
            entropy,
        }
    }
}

pub struct LiveEngine<E, P> {
    config: ArtificerConfig,
    env: E,
    perception: P,
    rng: SimRng,
    tick: Tick,
    model: OutcomeModel,
    replay: ReplayBuffer,
    embedding: ToolEffectEmbedding,
    scheduler: TrainingScheduler,
    controller: ClosedLoopController,
    stall: StallDetector,
    population: PopulationController,
    regime: RegimeMachine,
    agent_cursor: usize,
    memories: BTreeMap<AgentId, AgentMemory>,
    anchor: Option<ObjectId>,
    control_round: usize,
    directive: PopulationDirective,
    rolling: RollingMetrics,
}

impl LiveEngine<SandboxWorld, LinearPerception> {
    /// Engine over a freshly generated sandbox; generation draws from the run's stream.
    pub fn sandbox(config: ArtificerConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let mut rng = SimRng::seed_from_u64(config.rng_seed);
        let world = SandboxWorld::generate(config.sandbox.clone(), &mut rng);
        Ok(Self::assemble(config, world, LinearPerception::default(), rng))
    }
}

impl<E: Environment, P: Perception> LiveEngine<E, P> {
    pub fn new(config: ArtificerConfig, env: E, perception: P) -> Result<Self, EngineError> {
        config.validate()?;
        let rng = SimRng::seed_from_u64(config.rng_seed);
        Ok(Self::assemble(config, env, perception, rng))
    }

    fn assemble(config: ArtificerConfig, env: E, perception: P, rng: SimRng) -> Self {
        let mut scheduler = TrainingScheduler::new();
        if config.training.enabled {
            scheduler.start();
        }
        let mut population = PopulationController::new(config.population.clone());
        let directive = population.evaluate(env.population());
        Self {
            model: OutcomeModel::new(),
            replay: ReplayBuffer::new(config.training.replay_capacity),
            embedding: ToolEffectEmbedding::new(config.embedding.clone()),
            scheduler,
            controller: ClosedLoopController::new(config.controller.clone()),
            stall: StallDetector::new(config.stall.clone()),
            population,
            regime: RegimeMachine::new(config.regime.clone(), config.stability_window_ticks()),
            tick: Tick::zero(),
            agent_cursor: 0,
            memories: BTreeMap::new(),
            anchor: None,
            control_round: 0,
            directive,
            rolling: RollingMetrics::default(),
            config,
            env,
            perception,
            rng,
        }
    }

    /// Rebuild an engine from a snapshot; `env` must be the world as it was when the
    /// snapshot was taken.
    pub fn restore(
        config: ArtificerConfig,
        env: E,
        mut perception: P,
        snapshot: EngineSnapshot,
    ) -> Result<Self, EngineError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EngineError::UnsupportedSnapshot {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        config.validate()?;
        perception.load_weights(&snapshot.perception)?;
        let EngineSnapshot {
            tick,
            rng,
            model,
            agents,
            state,
            ..
        } = snapshot;
        Ok(Self {
            config,
            env,
            perception,
            rng: SimRng::restore(rng),
            tick,
            model,
            replay: state.replay,
            embedding: state.embedding,
            scheduler: state.scheduler,
            controller: state.controller,
            stall: state.stall,
            population: state.population,
            regime: state.regime,
            agent_cursor: state.agent_cursor,
            memories: agents,
            anchor: state.anchor,
            control_round: state.control_round,
            directive: state.directive,
            rolling: state.rolling,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ArtificerConfig {
        &self.config
    }

    #[must_use]
    pub const fn tick_count(&self) -> Tick {
        self.tick
    }

    /// Simulated seconds elapsed.
    #[must_use]
    pub fn sim_time(&self) -> f32 {
        self.tick.seconds(self.config.tick_rate_hz)
    }

    fn sim_time_precise(&self) -> f64 {
        self.tick.0 as f64 / f64::from(self.config.tick_rate_hz)
    }

    #[must_use]
    pub const fn regime(&self) -> Regime {
        self.regime.regime()
    }

    #[must_use]
    pub const fn regime_machine(&self) -> &RegimeMachine {
        &self.regime
    }

    #[must_use]
    pub const fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    #[must_use]
    pub const fn perception(&self) -> &P {
        &self.perception
    }

    #[must_use]
    pub const fn model(&self) -> &OutcomeModel {
        &self.model
    }

    /// Mutable model access, e.g. to freeze weights for ablation runs.
    pub fn model_mut(&mut self) -> &mut OutcomeModel {
        &mut self.model
    }

    #[must_use]
    pub const fn replay(&self) -> &ReplayBuffer {
        &self.replay
    }

    #[must_use]
    pub const fn scheduler(&self) -> &TrainingScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut TrainingScheduler {
        &mut self.scheduler
    }

    #[must_use]
    pub const fn stall_detector(&self) -> &StallDetector {
        &self.stall
    }

    #[must_use]
    pub const fn controller(&self) -> &ClosedLoopController {
        &self.controller
    }

    #[must_use]
    pub const fn embedding(&self) -> &ToolEffectEmbedding {
        &self.embedding
    }

    #[must_use]
    pub const fn anchor(&self) -> Option<ObjectId> {
        self.anchor
    }

    #[must_use]
    pub fn memory(&self, agent: AgentId) -> Option<&AgentMemory> {
        self.memories.get(&agent)
    }

    #[must_use]
    pub const fn rolling(&self) -> &RollingMetrics {
        &self.rolling
    }

    #[must_use]
    pub fn aggregate(&self) -> AggregateMetrics {
        AggregateMetrics {
            resource_per_minute: self.rolling.resource_per_minute(),
            mean_prediction_error: self.model.mean_prediction_error(),
            windowed_prediction_error: self.regime.windowed_prediction_error(),
            novel_per_minute: self.rolling.novel_per_minute(),
            embedding_clusters: self.embedding.cluster_count(),
            replay_size: self.replay.len(),
            stalls_total: self.stall.stalls_total(),
        }
    }

    /// Deep copy of all loop-owned state.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            tick: self.tick,
            sim_time: self.sim_time(),
            rng: self.rng.state(),
            metrics: self.aggregate(),
            model: self.model.clone(),
            perception: self.perception.weights(),
            agents: self.memories.clone(),
            state: EngineState {
                replay: self.replay.clone(),
                embedding: self.embedding.clone(),
                scheduler: self.scheduler.clone(),
                controller: self.controller.clone(),
                stall: self.stall.clone(),
                population: self.population.clone(),
                regime: self.regime.clone(),
                agent_cursor: self.agent_cursor,
                anchor: self.anchor,
                control_round: self.control_round,
                directive: self.directive,
                rolling: self.rolling.clone(),
            },
        }
    }

    /// Advance the loop by one tick.
    pub fn tick(&mut self) -> TickReport {
        self.tick = self.tick.next();
        let now = self.sim_time();
        let mut events = Vec::new();

        self.stage_pressure(&mut events);
        self.stage_regime(now, &mut events);
        self.stage_anchor_check(&mut events);

        let mut reward = 0.0;
        let mut prediction_error = None;
        let mut decision = None;
        if let Some(agent) = self.stage_select_agent() {
            let chosen = self.stage_decide(&agent);
            let (gained, outcome) = self.stage_apply(agent.id, &chosen.action, &mut events);
            reward = gained;
            prediction_error = self.stage_learn(now, &chosen, outcome, reward);
            self.stage_stall(agent.id, &chosen.action, reward, &mut events);
            self.stage_memory(agent.id, &chosen.action, reward);
            decision = Some(chosen);
        }

        let entropy = decision.as_ref().map_or(0.0, |d| d.entropy);
        self.stage_training(entropy, &mut events);
        self.stage_population();
        self.stage_metrics(now);

        let action = decision.as_ref().map(|d| d.action);
        let regime = self.regime.regime();
        if let Some(action) = &action {
            debug!(
                tick = self.tick.0,
                verb = action.verb.as_str(),
                regime = regime.as_str(),
                reward,
                "tick decided"
            );
        }
        TickReport {
            tick: self.tick,
            sim_time: now,
            agent: action.map(|a| a.agent),
            action,
            source: decision.as_ref().map_or(DecisionSource::Rest, |d| d.source),
            regime,
            reward,
            prediction_error,
            candidates: decision.as_ref().map_or(0, |d| d.candidates),
            entropy,
            metrics: self.aggregate(),
            training: self
                .scheduler
                .metrics(self.sim_time_precise(), self.replay.len()),
            directive: self.directive,
            events,
        }
    }

    fn stage_pressure(&mut self, events: &mut Vec<TickEvent>) {
        let report = self.env.apply_pressure(&self.directive, &mut self.rng);
        if report.spawned > 0 || report.cleaned > 0 {
            events.push(TickEvent::PopulationAdjusted {
                spawned: report.spawned,
                cleaned: report.cleaned,
            });
        }
    }

    fn stage_regime(&mut self, now: f32, events: &mut Vec<TickEvent>) {
        if let Some(transition) = self
            .regime
            .evaluate(now, self.model.mean_prediction_error())
        {
            events.push(TickEvent::RegimeChanged {
                from: transition.from,
                to: transition.to,
                reason: transition.reason,
            });
        }
    }

    fn stage_anchor_check(&mut self, events: &mut Vec<TickEvent>) {
        let Some(anchor) = self.anchor else {
            return;
        };
        if self.env.object(anchor).is_none_or(|view| !view.anchored) {
            info!(?anchor, "anchor lost");
            self.anchor = None;
            events.push(TickEvent::AnchorLost { object: anchor });
        }
    }

    fn stage_select_agent(&mut self) -> Option<AgentView> {
        let agents = self.env.agents();
        if agents.is_empty() {
            return None;
        }
        let idx = if self.config.deterministic {
            let idx = self.agent_cursor % agents.len();
            self.agent_cursor = self.agent_cursor.wrapping_add(1);
            idx
        } else {
            self.rng.random_range(0..agents.len())
        };
        let id = agents[idx];
        self.env.replenish(id, self.config.energy_replenish);
        self.env.agent(id)
    }

    fn stage_decide(&mut self, agent: &AgentView) -> Decision {
        if agent.energy < self.config.energy_floor {
            return Decision::rest(agent.id, 0, 0.0);
        }
        let mut pool = candidates::build(
            &self.env,
            &self.perception,
            agent,
            &self.config,
            &mut self.rng,
        );
        let empty = RecentWindow::default();
        let recent = self
            .memories
            .get(&agent.id)
            .map_or(&empty, |memory| &memory.recent);
        candidates::score(&mut pool, &self.model, recent, self.regime.regime());
        let entropy = candidates::entropy(&pool);
        let count = pool.len();
        let Some(mut chosen) = candidates::best(&pool) else {
            return Decision::rest(agent.id, 0, entropy);
        };

        let mut source = DecisionSource::Scored;
        let mut forced = None;
        if self.regime.regime() == Regime::Manufacture {
            forced = self.manufacture_override(agent);
        }
        if self.stall.is_in_forced_explore(agent.id) {
            let exploratory: Vec<usize> = pool
                .iter()
                .enumerate()
                .filter(|(_, candidate)| candidate.action.verb.is_exploratory())
                .map(|(idx, _)| idx)
                .collect();
            let options: Vec<usize> = if exploratory.is_empty() {
                (0..pool.len()).collect()
            } else {
                exploratory
            };
            chosen = options[self.rng.random_range(0..options.len())];
            source = DecisionSource::ForcedExplore;
            forced = None;
        }
        if let Some((action, source)) = forced {
            return Decision::forced(action, source, count, entropy);
        }
        let candidate = pool.swap_remove(chosen);
        Decision {
            action: candidate.action,
            input: candidate.input,
            prediction: candidate.prediction,
            source,
            candidates: count,
            entropy,
        }
    }

    /// ANCHOR on cadence until a station exists, then CONTROL on cadence.
    fn manufacture_override(&self, agent: &AgentView) -> Option<(Action, DecisionSource)> {
        let tick = self.tick.0;
        match self.anchor {
            None if tick.is_multiple_of(self.config.anchor_cadence) => {
                let anchorable = |id: &ObjectId| {
                    self.env.object(*id).is_some_and(|view| {
                        !view.anchored
                            && matches!(view.kind, ObjectKind::Raw | ObjectKind::Abrasive)
                    })
                };
                let object = agent.held.filter(anchorable).or_else(|| {
                    self.env
                        .nearby_objects(agent.id, usize::MAX)
                        .into_iter()
                        .find(anchorable)
                })?;
                Some((
                    Action::new(agent.id, Verb::Anchor, Some(object), None),
                    DecisionSource::AnchorOverride,
                ))
            }
            Some(anchor)
                if tick.is_multiple_of(self.config.control_cadence)
                    && !self.config.control_targets.is_empty() =>
            {
                Some((
                    Action::new(agent.id, Verb::Control, Some(anchor), None),
                    DecisionSource::ControlOverride,
                ))
            }
            _ => None,
        }
    }

    fn stage_apply(
        &mut self,
        agent: AgentId,
        action: &Action,
        events: &mut Vec<TickEvent>,
    ) -> (f32, Option<Outcome>) {
        if action.verb == Verb::Control {
            let reward = action
                .object
                .map_or(0.0, |anchor| self.run_controller(agent, anchor, events));
            return (reward, None);
        }
        if self.env.apply(action, &mut self.rng) == ApplyStatus::Unresolved {
            return (0.0, None);
        }
        if action.verb == Verb::Anchor
            && let Some(object) = action.object
        {
            info!(?object, tick = self.tick.0, "anchor established");
            self.anchor = Some(object);
            self.controller.select_target();
            events.push(TickEvent::AnchorEstablished { object });
        }
        let outcome = self.env.last_outcome();
        (outcome.map_or(0.0, |outcome| outcome.effectiveness()), outcome)
    }

    fn run_controller(
        &mut self,
        agent: AgentId,
        anchor: ObjectId,
        events: &mut Vec<TickEvent>,
    ) -> f32 {
        let targets = &self.config.control_targets;
        if targets.is_empty() {
            return 0.0;
        }
        let ControlTarget { metric, target } = targets[self.control_round % targets.len()];
        let Some(step) = self
            .controller
            .step(&mut self.env, agent, anchor, metric, target, &mut self.rng)
        else {
            self.anchor = None;
            events.push(TickEvent::AnchorLost { object: anchor });
            return 0.0;
        };
        match step.phase {
            ControllerPhase::Converged => {
                info!(?anchor, metric = metric.as_str(), error = step.error_after, "controller converged");
                events.push(TickEvent::ControllerConverged {
                    object: anchor,
                    metric,
                    error: step.error_after,
                });
                self.control_round += 1;
                self.controller.select_target();
            }
            ControllerPhase::Blocked => {
                events.push(TickEvent::ControllerBlocked {
                    object: anchor,
                    metric,
                });
                self.control_round += 1;
                self.controller.select_target();
            }
            _ => {}
        }
        (1.0 - step.error_after).clamp(0.0, 1.0)
    }

    fn stage_learn(
        &mut self,
        now: f32,
        decision: &Decision,
        outcome: Option<Outcome>,
        reward: f32,
    ) -> Option<f32> {
        let outcome = outcome?;
        self.rolling.record_resource(now, reward);
        if let Some(tool) = decision.action.object {
            self.embedding.observe(tool, &outcome);
        }
        let input = decision.input?;
        let prediction = decision
            .prediction
            .unwrap_or_else(|| self.model.predict(&input));
        let prediction_error = prediction.observable_error(&outcome);
        if self.model.visits(&input) == 0 {
            self.rolling.record_novel(now);
        }
        self.model
            .update(&input, &outcome, self.config.learning_rate);
        self.replay.push(Transition {
            input,
            outcome,
            verb: decision.action.verb,
            tool: decision.action.object,
            reward,
            priority: None,
        });
        self.replay.update_last_priority(prediction_error);
        self.regime.observe_prediction_error(prediction_error);
        Some(prediction_error)
    }

    fn stage_stall(
        &mut self,
        agent: AgentId,
        action: &Action,
        reward: f32,
        events: &mut Vec<TickEvent>,
    ) {
        if self
            .stall
            .record(agent, self.tick, action.verb, reward, action.target, action.object)
        {
            events.push(TickEvent::StallDetected { agent });
        }
    }

    fn stage_memory(&mut self, agent: AgentId, action: &Action, reward: f32) {
        let capacity = self.config.recent_window;
        let memory = self.memories.entry(agent).or_default();
        memory.recent.push(RecentKey::of(action), capacity);
        memory.total_reward += reward;
        memory.actions += 1;
        memory.last_verb = Some(action.verb);
    }

    /// Replay retraining under the per-second budget.
    fn stage_training(&mut self, entropy: f32, events: &mut Vec<TickEvent>) {
        let training = &self.config.training;
        if !training.enabled
            || !self.tick.0.is_multiple_of(training.interval_ticks)
            || self.replay.is_empty()
            || !self.scheduler.is_active()
        {
            return;
        }
        let now = self.tick.0 as f64 / f64::from(self.config.tick_rate_hz);
        let batch = if training.prioritized {
            self.replay
                .sample_prioritized(training.batch_size, training.priority_alpha, &mut self.rng)
        } else {
            self.replay.sample_last(training.batch_size)
        };
        for transition in &batch {
            if !self.scheduler.has_budget(now, training.budget_ms_per_sec) {
                self.scheduler.record_rate_limited();
                events.push(TickEvent::TrainingRateLimited);
                break;
            }
            let started = (!self.config.deterministic).then(Instant::now);
            let loss = self
                .model
                .fit(&transition.input, &transition.outcome, training.learning_rate);
            if !loss.is_finite() {
                let message = format!("non-finite replay loss at tick {}", self.tick.0);
                self.scheduler.record_error(message.clone());
                events.push(TickEvent::TrainingError { message });
                break;
            }
            let cost = started.map_or(training.simulated_cost_ms, |started| {
                started.elapsed().as_secs_f32() * 1_000.0
            });
            self.scheduler.record_step(cost, loss, entropy, now);
        }
    }

    fn stage_population(&mut self) {
        self.directive = self.population.evaluate(self.env.population());
    }

    fn stage_metrics(&mut self, now: f32) {
        self.rolling.prune(now);
        self.regime.record_tick(
            self.rolling.novel_per_minute(),
            self.rolling.resource_per_minute(),
        );
    }
}
