//! Policy trait and implementations.
//!
//! The PPO policies require the `rl-nn` feature.

#[cfg(feature = "rl-nn")]
pub mod ppo;
pub mod random;
#[cfg(feature = "rl-nn")]
pub mod recurrent;
pub mod trait_;

#[cfg(feature = "rl-nn")]
pub use ppo::PpoPolicy;
pub use random::RandomPolicy;
#[cfg(feature = "rl-nn")]
pub use recurrent::RecurrentPpoPolicy;
pub use trait_::{Decision, LossMetrics, Policy};
