//! Per-tool exponential moving average of observed outcomes.

use artificer_core::{EmbeddingConfig, OUTCOME_SIZE, ObjectId, Outcome, pairs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn cosine(a: &[f32; OUTCOME_SIZE], b: &[f32; OUTCOME_SIZE]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    match (na > f32::EPSILON, nb > f32::EPSILON) {
        (true, true) => dot / (na * nb),
        // inert tools only resemble each other
        (false, false) => 1.0,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolEffectEmbedding {
    config: EmbeddingConfig,
    #[serde(with = "pairs")]
    vectors: BTreeMap<ObjectId, [f32; OUTCOME_SIZE]>,
}

impl ToolEffectEmbedding {
    #[must_use]
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            vectors: BTreeMap::new(),
        }
    }

    /// Blend an observed outcome into the tool's vector; the first sample seeds it.
    pub fn observe(&mut self, tool: ObjectId, outcome: &Outcome) {
        let sample = outcome.to_array();
        let decay = self.config.decay;
        self.vectors
            .entry(tool)
            .and_modify(|vector| {
                for (value, new) in vector.iter_mut().zip(sample.iter()) {
                    *value = (1.0 - decay) * *value + decay * new;
                }
            })
            .or_insert(sample);
    }

    #[must_use]
    pub fn vector(&self, tool: ObjectId) -> Option<&[f32; OUTCOME_SIZE]> {
        self.vectors.get(&tool)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Greedy leader clustering by cosine similarity, in tool-id order.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        let threshold = self.config.cluster_similarity;
        let mut leaders: Vec<&[f32; OUTCOME_SIZE]> = Vec::new();
        for vector in self.vectors.values() {
            if !leaders
                .iter()
                .any(|leader| cosine(leader, vector) >= threshold)
            {
                leaders.push(vector);
            }
        }
        leaders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn tools(n: usize) -> Vec<ObjectId> {
        let mut map: SlotMap<ObjectId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn ema_blends_toward_new_samples() {
        let ids = tools(1);
        let mut embedding = ToolEffectEmbedding::new(EmbeddingConfig {
            decay: 0.5,
            ..EmbeddingConfig::default()
        });
        embedding.observe(ids[0], &Outcome::new(1.0, 0.0, 0.0, 0.0));
        embedding.observe(ids[0], &Outcome::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(embedding.vector(ids[0]), Some(&[0.5, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn similar_tools_share_a_cluster() {
        let ids = tools(4);
        let mut embedding = ToolEffectEmbedding::new(EmbeddingConfig::default());
        embedding.observe(ids[0], &Outcome::new(0.8, 0.1, 0.2, 0.0));
        embedding.observe(ids[1], &Outcome::new(0.7, 0.1, 0.2, 0.0));
        embedding.observe(ids[2], &Outcome::new(0.0, 0.05, 0.0, 0.6));
        embedding.observe(ids[3], &Outcome::ZERO);
        assert_eq!(embedding.len(), 4);
        assert_eq!(embedding.cluster_count(), 3);
    }
}
