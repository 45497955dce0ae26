//! Trailing-minute rates fed to the regime machine and reported each tick.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const MINUTE_SECS: f32 = 60.0;

/// Novel interactions and resource gains over the trailing simulated minute.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RollingMetrics {
    novel: VecDeque<f32>,
    resource: VecDeque<(f32, f32)>,
    resource_total: f32,
    novel_total: u64,
}

impl RollingMetrics {
    pub fn record_novel(&mut self, now: f32) {
        self.novel.push_back(now);
        self.novel_total += 1;
    }

    pub fn record_resource(&mut self, now: f32, amount: f32) {
        if amount > 0.0 && amount.is_finite() {
            self.resource.push_back((now, amount));
            self.resource_total += amount;
        }
    }

    /// Drop samples older than one minute before `now`.
    pub fn prune(&mut self, now: f32) {
        while self.novel.front().is_some_and(|at| now - at >= MINUTE_SECS) {
            self.novel.pop_front();
        }
        while self
            .resource
            .front()
            .is_some_and(|(at, _)| now - at >= MINUTE_SECS)
        {
            self.resource.pop_front();
        }
    }

    #[must_use]
    pub fn novel_per_minute(&self) -> f32 {
        self.novel.len() as f32
    }

    #[must_use]
    pub fn resource_per_minute(&self) -> f32 {
        self.resource.iter().map(|(_, amount)| amount).sum()
    }

    #[must_use]
    pub const fn resource_total(&self) -> f32 {
        self.resource_total
    }

    #[must_use]
    pub const fn novel_total(&self) -> u64 {
        self.novel_total
    }
}

/// Aggregate view exported in tick reports and snapshots.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregateMetrics {
    pub resource_per_minute: f32,
    pub mean_prediction_error: f32,
    pub windowed_prediction_error: f32,
    pub novel_per_minute: f32,
    pub embedding_clusters: usize,
    pub replay_size: usize,
    pub stalls_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_cover_the_trailing_minute() {
        let mut metrics = RollingMetrics::default();
        metrics.record_novel(1.0);
        metrics.record_novel(30.0);
        metrics.record_resource(2.0, 1.5);
        metrics.record_resource(40.0, 0.5);
        metrics.record_resource(41.0, -3.0);
        metrics.prune(45.0);
        assert_eq!(metrics.novel_per_minute(), 2.0);
        assert_eq!(metrics.resource_per_minute(), 2.0);

        metrics.prune(62.5);
        assert_eq!(metrics.novel_per_minute(), 1.0);
        assert_eq!(metrics.resource_per_minute(), 0.5);
        assert_eq!(metrics.resource_total(), 2.0);
        assert_eq!(metrics.novel_total(), 2);
    }
}
