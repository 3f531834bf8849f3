//! Random policy for baselines and correctness checks.

use rand::rngs::StdRng;
use rand::Rng;

use super::trait_::{Decision, LossMetrics, Policy};
use crate::algorithms::rl::observation::Observation;
use crate::algorithms::rl::training::buffer::RolloutBuffer;

/// Uniformly random choice among the legal candidates.
///
/// Skips only when no candidate exists. Draws from the trainer's seeded
/// RNG, so a run with a fixed seed is exactly reproducible.
#[derive(Debug, Default)]
pub struct RandomPolicy;

impl RandomPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, observation: &Observation, rng: &mut StdRng) -> Decision {
        let n = observation.n_candidates;
        if n == 0 {
            return Decision {
                action: 0,
                log_prob: 0.0,
                value: 0.0,
                hidden: Vec::new(),
            };
        }
        Decision {
            action: rng.gen_range(1..=n),
            log_prob: -(n as f64).ln(),
            value: 0.0,
            hidden: Vec::new(),
        }
    }

    fn update(&mut self, _batch: &RolloutBuffer) -> LossMetrics {
        LossMetrics::default()
    }

    fn name(&self) -> &str {
        "random"
    }
}
