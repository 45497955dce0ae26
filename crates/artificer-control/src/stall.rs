//! Per-agent loop/spam detection with a forced-exploration cooldown.

use artificer_core::{AgentId, ObjectId, StallConfig, Tick, Verb, pairs};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    /// Flat reward while touching too few distinct objects.
    FlatReward,
    /// The same verb repeated at the tail of the window.
    Repetition,
}

/// Rolling state for one agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StallWindow {
    rewards: VecDeque<f32>,
    verbs: VecDeque<Verb>,
    touched: VecDeque<Vec<ObjectId>>,
    forced_explore_ticks: u32,
    stalls: u32,
    last_reason: Option<StallReason>,
}

impl StallWindow {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    #[must_use]
    pub const fn forced_explore_ticks(&self) -> u32 {
        self.forced_explore_ticks
    }

    #[must_use]
    pub const fn stalls(&self) -> u32 {
        self.stalls
    }

    #[must_use]
    pub const fn last_reason(&self) -> Option<StallReason> {
        self.last_reason
    }

    fn push(&mut self, capacity: usize, verb: Verb, reward: f32, touched: Vec<ObjectId>) {
        if self.rewards.len() == capacity {
            self.rewards.pop_front();
            self.verbs.pop_front();
            self.touched.pop_front();
        }
        self.rewards.push_back(if reward.is_finite() { reward } else { 0.0 });
        self.verbs.push_back(verb);
        self.touched.push_back(touched);
    }

    fn distinct_touched(&self) -> usize {
        self.touched
            .iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }

    fn tail_repeats(&self) -> usize {
        let Some(last) = self.verbs.back() else {
            return 0;
        };
        self.verbs.iter().rev().take_while(|verb| *verb == last).count()
    }

    fn reset(&mut self) {
        self.rewards.clear();
        self.verbs.clear();
        self.touched.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StallDetector {
    config: StallConfig,
    #[serde(with = "pairs")]
    windows: BTreeMap<AgentId, StallWindow>,
    stalls_total: u64,
}

impl StallDetector {
    #[must_use]
    pub fn new(config: StallConfig) -> Self {
        Self {
            config,
            windows: BTreeMap::new(),
            stalls_total: 0,
        }
    }

    /// Record one decision. Returns `true` when a stall is declared on this call.
    pub fn record(
        &mut self,
        agent: AgentId,
        tick: Tick,
        verb: Verb,
        reward: f32,
        target: Option<ObjectId>,
        tool: Option<ObjectId>,
    ) -> bool {
        let config = &self.config;
        let window = self.windows.entry(agent).or_default();
        if window.forced_explore_ticks > 0 {
            window.forced_explore_ticks -= 1;
            return false;
        }

        let touched = target.into_iter().chain(tool).collect();
        window.push(config.window, verb, reward, touched);
        if window.len() < config.min_samples {
            return false;
        }

        let oldest = window.rewards.front().copied().unwrap_or_default();
        let newest = window.rewards.back().copied().unwrap_or_default();
        let reason = if (newest - oldest).abs() < config.epsilon
            && window.distinct_touched() < config.min_targets
        {
            Some(StallReason::FlatReward)
        } else if window.tail_repeats() >= config.repeat_threshold {
            Some(StallReason::Repetition)
        } else {
            None
        };
        let Some(reason) = reason else {
            return false;
        };

        window.reset();
        window.stalls += 1;
        window.last_reason = Some(reason);
        window.forced_explore_ticks = config.cooldown_ticks;
        self.stalls_total += 1;
        debug!(?agent, tick = tick.0, ?reason, "stall detected; forcing exploration");
        true
    }

    #[must_use]
    pub fn is_in_forced_explore(&self, agent: AgentId) -> bool {
        self.windows
            .get(&agent)
            .is_some_and(|window| window.forced_explore_ticks > 0)
    }

    #[must_use]
    pub fn window(&self, agent: AgentId) -> Option<&StallWindow> {
        self.windows.get(&agent)
    }

    #[must_use]
    pub const fn stalls_total(&self) -> u64 {
        self.stalls_total
    }
}
