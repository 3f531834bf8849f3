//! Configuration for the timetabling environment and PPO training.

use serde::{Deserialize, Serialize};

/// Configuration for the assignment environment.
///
/// Controls the action space, the step budget and reward shaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RLConfig {
    // --- Observation / action space ---
    /// Number of ranked candidates offered per decision.
    pub top_m: usize,

    // --- Episode ---
    /// Step budget per episode, as a multiple of the lesson count.
    pub step_budget_factor: f64,

    // --- Reward shaping ---
    /// Reward subtracted for an action that points at no legal candidate.
    pub illegal_action_penalty: f64,
    /// Penalty for a lesson left unplaced, unless the lesson sets its own.
    pub unplaced_penalty: f64,
}

impl RLConfig {
    /// Number of features encoding the lesson being placed.
    pub const LESSON_FEATURE_DIM: usize = 7; // duration, size, legal, options, remaining, placed, hard

    /// Number of features encoding one candidate slot.
    pub const CANDIDATE_FEATURE_DIM: usize = 10; // exists, hard, soft, time, room, start, days, weeks, fill, load

    /// Observation dimension: lesson features + top_m × candidate features.
    pub fn observation_dim(&self) -> usize {
        Self::LESSON_FEATURE_DIM + self.top_m * Self::CANDIDATE_FEATURE_DIM
    }

    /// Step budget for an instance with `n_lessons` lessons.
    pub fn step_budget(&self, n_lessons: usize) -> usize {
        ((n_lessons as f64) * self.step_budget_factor).ceil().max(n_lessons as f64) as usize
    }
}

impl Default for RLConfig {
    fn default() -> Self {
        Self {
            top_m: 8,
            step_budget_factor: 2.0,
            illegal_action_penalty: 100.0,
            unplaced_penalty: 1000.0,
        }
    }
}

/// Training hyperparameters for the PPO family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Number of training epochs.
    pub epochs: u32,
    /// Episodes collected per epoch.
    pub episodes_per_epoch: u32,
    /// Epochs used when `quickrun` is set.
    pub quickrun_epochs: u32,
    /// Episodes per epoch used when `quickrun` is set.
    pub quickrun_episodes: u32,
    /// Discount factor γ.
    pub gamma: f64,
    /// GAE λ parameter (1 = reward-to-go minus baseline).
    pub gae_lambda: f64,
    /// PPO clip parameter ε.
    pub clip_eps: f64,
    /// Entropy bonus coefficient.
    pub entropy_coef: f64,
    /// Value loss coefficient.
    pub value_coef: f64,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Number of PPO optimization passes per update.
    pub n_epochs: u32,
    /// Maximum gradient norm for clipping.
    pub max_grad_norm: f64,
    /// Scale applied to rewards before advantage estimation.
    pub reward_scale: f64,
    /// Hidden state size of the recurrent policy.
    pub hidden_dim: usize,
}

impl TrainingConfig {
    /// `(epochs, episodes_per_epoch)` for a run.
    pub fn schedule(&self, quickrun: bool) -> (u32, u32) {
        if quickrun {
            (self.quickrun_epochs, self.quickrun_episodes)
        } else {
            (self.epochs, self.episodes_per_epoch)
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            episodes_per_epoch: 4,
            quickrun_epochs: 3,
            quickrun_episodes: 1,
            gamma: 1.0,
            gae_lambda: 1.0,
            clip_eps: 0.2,
            entropy_coef: 0.01,
            value_coef: 0.5,
            learning_rate: 3e-3,
            n_epochs: 4,
            max_grad_norm: 0.5,
            reward_scale: 1e-3,
            hidden_dim: 16,
        }
    }
}
