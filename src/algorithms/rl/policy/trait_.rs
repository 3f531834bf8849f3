//! Policy trait for the assignment environment.

use rand::rngs::StdRng;
use serde::Serialize;

use crate::algorithms::rl::observation::Observation;
use crate::algorithms::rl::training::buffer::RolloutBuffer;

/// One action choice with the quantities PPO needs later.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// 0 = skip, 1..=M = candidate.
    pub action: usize,
    /// Log-probability of `action` under the acting policy.
    pub log_prob: f64,
    /// Critic estimate of the return from this state.
    pub value: f64,
    /// Recurrent state the decision was made with (empty if stateless).
    pub hidden: Vec<f64>,
}

/// Scalar diagnostics of one parameter update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LossMetrics {
    pub policy_loss: f64,
    pub value_loss: f64,
    pub entropy: f64,
    /// `policy_loss + value_coef * value_loss - entropy_coef * entropy`
    pub total: f64,
}

impl LossMetrics {
    pub fn is_finite(&self) -> bool {
        self.policy_loss.is_finite()
            && self.value_loss.is_finite()
            && self.entropy.is_finite()
            && self.total.is_finite()
    }
}

/// A policy that selects actions for one agent.
///
/// Actions are indices into the skip + Top-M set:
/// - 0: skip the lesson (penalized)
/// - 1..=M: place the lesson at the corresponding ranked candidate
pub trait Policy {
    /// Selects an action for one observation.
    ///
    /// No side effects other than the recurrent hidden state update.
    ///
    /// # Arguments
    ///
    /// * `observation` - Encoded decision (from [`ObservationBuilder`](crate::algorithms::rl::ObservationBuilder))
    /// * `rng` - Episode RNG owned by the trainer
    fn act(&mut self, observation: &Observation, rng: &mut StdRng) -> Decision;

    /// Updates parameters from a batch with advantages already computed.
    ///
    /// Parameters are left untouched when the loss comes out non-finite.
    fn update(&mut self, batch: &RolloutBuffer) -> LossMetrics;

    /// Clears per-episode state. Called before every episode.
    fn begin_episode(&mut self) {}

    /// Returns a human-readable name for this policy.
    fn name(&self) -> &str;
}
