//! ett-marl - Multi-agent reinforcement learning for university course timetabling.
//!
//! Assigns every lesson of a timetabling instance to a (room, time slot) pair
//! using a pool of cooperating PPO agents, streaming per-epoch training
//! progress to an external sink while the run proceeds in the background.

pub mod algorithms;
pub mod constraints;
pub mod logging;
pub mod problem;
pub mod progress;
pub mod run;
pub mod schedule;
pub mod settings;

pub use problem::{Problem, ProblemLoadError};
pub use run::{RunHandle, StartResponse, TrainingService};
pub use settings::RunSettings;

/// Identifier type used for lessons, rooms, time slots, distributions and groups.
pub type Id = u32;

/// Identifier of a single training run.
pub type RunId = uuid::Uuid;

/// Generates a new unique run identifier (UUID v4).
pub fn generate_run_id() -> RunId {
    uuid::Uuid::new_v4()
}
