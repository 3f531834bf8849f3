//! RL-based scheduling module.
//!
//! An [`RLEnvironment`] places lessons one decision at a time; an
//! [`AgentPool`] of policies takes turns choosing among the top-ranked
//! candidates; the [`Trainer`] runs epochs of episodes and updates each
//! agent with PPO.
//!
//! The PPO networks are built on tch and need the `rl-nn` feature; without
//! it only the `Random` method runs.

pub mod agent;
pub mod candidates;
pub mod config;
pub mod environment;
#[cfg(feature = "rl-nn")]
pub mod network;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod training;
pub mod types;

pub use agent::{Agent, AgentPool};
pub use candidates::{Candidate, CandidateSet};
pub use config::{RLConfig, TrainingConfig};
pub use environment::{EnvironmentError, EpisodeState, RLEnvironment, StepOutcome, StepResult};
pub use observation::{Observation, ObservationBuilder};
#[cfg(feature = "rl-nn")]
pub use network::tch_device;
pub use policy::{Policy, RandomPolicy};
#[cfg(feature = "rl-nn")]
pub use policy::{PpoPolicy, RecurrentPpoPolicy};
pub use reward::RewardComputer;
pub use training::{StopSignal, Trainer, TrainerSetup, TrainingError, TrainingOutcome};
pub use types::{ComputeDevice, Method, PartitionId, UnknownMethod};
