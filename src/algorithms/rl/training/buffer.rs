//! Per-agent rollout buffer.

use crate::algorithms::rl::observation::Observation;
use crate::algorithms::rl::policy::Decision;

/// A single transition stored in the buffer.
#[derive(Debug, Clone)]
pub struct Transition {
    pub observation: Observation,
    pub action: usize,
    /// Step reward, already scaled for learning.
    pub reward: f64,
    /// Log-probability of `action` when it was taken.
    pub log_prob: f64,
    /// Critic estimate at act time.
    pub value: f64,
    /// Whether this was the agent's last step of the episode.
    pub done: bool,
    /// Recurrent state used at act time.
    pub hidden: Vec<f64>,
}

impl Transition {
    pub fn new(observation: Observation, decision: Decision, reward: f64) -> Self {
        Self {
            observation,
            action: decision.action,
            reward,
            log_prob: decision.log_prob,
            value: decision.value,
            done: false,
            hidden: decision.hidden,
        }
    }
}

/// Rollout buffer that stores one agent's transitions for PPO updates.
///
/// Accumulates transitions across the episodes of an epoch; advantages
/// and returns are filled in by [`compute_gae`](super::gae::compute_gae).
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    pub transitions: Vec<Transition>,
    pub advantages: Vec<f64>,
    pub returns: Vec<f64>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    /// Marks the most recent transition as the end of an episode.
    pub fn end_episode(&mut self) {
        if let Some(last) = self.transitions.last_mut() {
            last.done = true;
        }
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
        self.advantages.clear();
        self.returns.clear();
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// `(transition, advantage, return)` triples; empty until advantages
    /// are computed.
    pub fn samples(&self) -> impl Iterator<Item = (&Transition, f64, f64)> + '_ {
        self.transitions
            .iter()
            .zip(&self.advantages)
            .zip(&self.returns)
            .map(|((t, &a), &r)| (t, a, r))
    }

    /// Normalizes advantages to zero mean and unit variance.
    pub fn normalize_advantages(&mut self) {
        if self.advantages.len() < 2 {
            return;
        }
        let n = self.advantages.len() as f64;
        let mean = self.advantages.iter().sum::<f64>() / n;
        let var = self.advantages.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
        let std = (var + 1e-8).sqrt();
        for a in &mut self.advantages {
            *a = (*a - mean) / std;
        }
    }
}
