//! PPO policy over the skip + Top-M action set.

use rand::rngs::StdRng;
use tch::{Device, TchError};

use super::trait_::{Decision, LossMetrics, Policy};
use crate::algorithms::rl::config::{RLConfig, TrainingConfig};
use crate::algorithms::rl::network::ActorCritic;
use crate::algorithms::rl::observation::Observation;
use crate::algorithms::rl::training::buffer::RolloutBuffer;

/// PPO agent policy for multi-agent training.
pub struct PpoPolicy {
    net: ActorCritic,
}

impl PpoPolicy {
    /// Creates a policy with seeded initial weights.
    ///
    /// # Arguments
    ///
    /// * `env_config` - Determines the observation dimension
    /// * `config` - PPO hyperparameters
    /// * `device` - Device to run on (CPU or CUDA)
    /// * `seed` - Seed of the initial weights
    pub fn new(
        env_config: &RLConfig,
        config: TrainingConfig,
        device: Device,
        seed: u64,
    ) -> Result<Self, TchError> {
        Ok(Self {
            net: ActorCritic::new(env_config.observation_dim(), 0, config, device, seed)?,
        })
    }
}

impl Policy for PpoPolicy {
    fn act(&mut self, observation: &Observation, rng: &mut StdRng) -> Decision {
        self.net.decide(observation, Vec::new(), rng)
    }

    fn update(&mut self, batch: &RolloutBuffer) -> LossMetrics {
        self.net.update(batch)
    }

    fn name(&self) -> &str {
        "ppo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::rl::training::buffer::Transition;
    use crate::algorithms::rl::training::gae::compute_gae;
    use rand::SeedableRng;

    const L: usize = RLConfig::LESSON_FEATURE_DIM;
    const C: usize = RLConfig::CANDIDATE_FEATURE_DIM;

    fn config() -> RLConfig {
        RLConfig {
            top_m: 2,
            ..RLConfig::default()
        }
    }

    fn policy(seed: u64) -> PpoPolicy {
        PpoPolicy::new(&config(), TrainingConfig::default(), Device::Cpu, seed).unwrap()
    }

    /// Two candidates: the first clean, the second with one hard violation.
    fn obs() -> Observation {
        let mut features = vec![0.0; config().observation_dim()];
        features[0] = 0.1;
        features[L] = 1.0;
        features[L + C] = 1.0;
        features[L + C + 1] = 1.0;
        Observation {
            features,
            n_candidates: 2,
        }
    }

    fn batch(policy: &mut PpoPolicy, rng: &mut StdRng, n: usize) -> RolloutBuffer {
        let mut buf = RolloutBuffer::new();
        for _ in 0..n {
            let d = policy.act(&obs(), rng);
            let reward = match d.action {
                1 => 0.0,
                2 => -1.0,
                _ => -2.0,
            };
            buf.add(Transition::new(obs(), d, reward));
            buf.end_episode();
        }
        compute_gae(&mut buf, 1.0, 1.0);
        buf.normalize_advantages();
        buf
    }

    #[test]
    fn action_distribution_covers_skip_and_candidates() {
        let p = policy(1);
        let z = tch::no_grad(|| p.net.logits(&obs(), &[]));
        assert_eq!(z.size(), &[3]);
        let total = z.softmax(0, tch::Kind::Float).sum(tch::Kind::Float).double_value(&[]);
        assert!((total - 1.0).abs() < 1e-5);
        // the clean candidate starts out preferred over the violating one
        assert!(z.double_value(&[1]) > z.double_value(&[2]));
    }

    #[test]
    fn decisions_are_reproducible() {
        let run = || {
            let mut p = policy(9);
            let mut rng = StdRng::seed_from_u64(4);
            (0..10).map(|_| p.act(&obs(), &mut rng).action).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn update_returns_finite_metrics_and_moves_parameters() {
        let mut p = policy(3);
        let mut rng = StdRng::seed_from_u64(6);
        let buf = batch(&mut p, &mut rng, 16);
        let before = p.net.parameters();
        let metrics = p.update(&buf);
        assert!(metrics.is_finite());
        assert_ne!(p.net.parameters(), before);
    }

    #[test]
    fn non_finite_loss_leaves_parameters_untouched() {
        let mut p = policy(3);
        let mut rng = StdRng::seed_from_u64(6);
        let mut buf = batch(&mut p, &mut rng, 4);
        buf.returns[0] = f64::NAN;
        let before = p.net.parameters();
        let metrics = p.update(&buf);
        assert!(!metrics.is_finite());
        assert_eq!(p.net.parameters(), before);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut p = policy(3);
        let before = p.net.parameters();
        assert_eq!(p.update(&RolloutBuffer::new()), LossMetrics::default());
        assert_eq!(p.net.parameters(), before);
    }
}
