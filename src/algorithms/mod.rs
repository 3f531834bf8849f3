//! Scheduling algorithms.
//!
//! All methods live under [`rl`]: a random single-agent baseline and the
//! multi-agent PPO variants, selected once per run through [`Method`].

pub mod rl;

pub use rl::Method;
