//! Training infrastructure: rollout buffer, GAE and the epoch loop.

pub mod buffer;
pub mod gae;
pub mod trainer;

pub use buffer::{RolloutBuffer, Transition};
pub use trainer::{
    BestAssignment, EpochSummary, NumericInstabilityWarning, StopSignal, Trainer, TrainerSetup,
    TrainingError, TrainingOutcome,
};
