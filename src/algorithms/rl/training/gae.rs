//! Generalized Advantage Estimation (GAE-λ).
//!
//! With the default `λ = 1` and `γ = 1` the advantage is the undiscounted
//! reward-to-go minus the critic baseline.

use super::buffer::RolloutBuffer;

/// Fills `buffer.advantages` and `buffer.returns` from its transitions.
///
/// Episodes are delimited by the `done` flag; bootstrapping never crosses
/// an episode boundary. `returns = advantages + values`.
///
/// # Arguments
///
/// * `buffer` - One agent's transitions for an epoch
/// * `gamma` - Discount factor
/// * `gae_lambda` - GAE λ parameter (0 = TD(0), 1 = Monte Carlo)
pub fn compute_gae(buffer: &mut RolloutBuffer, gamma: f64, gae_lambda: f64) {
    let n = buffer.len();
    let mut advantages = vec![0.0; n];
    let mut gae = 0.0;

    for t in (0..n).rev() {
        let step = &buffer.transitions[t];
        let next_value = if step.done || t + 1 == n {
            0.0
        } else {
            buffer.transitions[t + 1].value
        };
        if step.done {
            gae = 0.0;
        }
        let delta = step.reward + gamma * next_value - step.value;
        gae = delta + gamma * gae_lambda * gae;
        advantages[t] = gae;
    }

    buffer.returns = advantages
        .iter()
        .zip(&buffer.transitions)
        .map(|(a, t)| a + t.value)
        .collect();
    buffer.advantages = advantages;
}
