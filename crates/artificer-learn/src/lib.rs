//! Online learning components: experience replay, the outcome model, tool-effect
//! embeddings, and the rate-limited training scheduler.

pub mod embedding;
pub mod model;
pub mod replay;
pub mod scheduler;

pub use embedding::ToolEffectEmbedding;
pub use model::{NoveltyKey, OutcomeModel};
pub use replay::{ReplayBuffer, Transition};
pub use scheduler::{TrainingMetrics, TrainingScheduler, TrainingState};
