//! Recurrent PPO policy.
//!
//! Each agent carries a hidden state across its own turns within an
//! episode, `h' = tanh(W_h h + W_x x)` with `x` the lesson features. The
//! recurrent weights are fixed random (reservoir style); only the readout
//! `U` in the candidate scores `hᵀ U φ` is trained, together with the rest
//! of the actor-critic. Sequencing rules such as precedence depend on what
//! the agent placed before, which `h` summarizes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::{Device, Kind, TchError, Tensor};

use super::trait_::{Decision, LossMetrics, Policy};
use crate::algorithms::rl::config::{RLConfig, TrainingConfig};
use crate::algorithms::rl::network::ActorCritic;
use crate::algorithms::rl::observation::Observation;
use crate::algorithms::rl::training::buffer::RolloutBuffer;

/// Fixed recurrent weights, never registered with the optimizer.
struct Reservoir {
    /// `H × H`
    w_h: Tensor,
    /// `H × L`
    w_x: Tensor,
}

impl Reservoir {
    fn new(hidden_dim: usize, device: Device, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        let (h, l) = (hidden_dim as i64, RLConfig::LESSON_FEATURE_DIM as i64);
        // keeps the spectral radius below one
        let scale = 0.9 / (hidden_dim.max(1) as f32).sqrt();
        let w_h: Vec<f32> = (0..h * h).map(|_| rng.gen_range(-1.0..1.0) * scale).collect();
        let w_x: Vec<f32> = (0..h * l).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Self {
            w_h: Tensor::from_slice(&w_h).reshape([h, h]).to_device(device),
            w_x: Tensor::from_slice(&w_x).reshape([h, l]).to_device(device),
        }
    }

    fn advance(&self, net: &ActorCritic, h: &[f64], x: &[f64]) -> Vec<f64> {
        tch::no_grad(|| {
            let next = (self.w_h.mv(&net.tensor(h)) + self.w_x.mv(&net.tensor(x)))
                .tanh()
                .to_kind(Kind::Double);
            let n = next.size()[0];
            (0..n).map(|i| next.double_value(&[i])).collect()
        })
    }
}

/// PPO policy conditioned on the agent's own decision history.
pub struct RecurrentPpoPolicy {
    net: ActorCritic,
    reservoir: Reservoir,
    hidden: Vec<f64>,
}

impl RecurrentPpoPolicy {
    /// Creates a policy whose hidden size is `config.hidden_dim`.
    pub fn new(
        env_config: &RLConfig,
        config: TrainingConfig,
        device: Device,
        seed: u64,
    ) -> Result<Self, TchError> {
        let hidden_dim = config.hidden_dim;
        let net = ActorCritic::new(env_config.observation_dim(), hidden_dim, config, device, seed)?;
        Ok(Self {
            reservoir: Reservoir::new(hidden_dim, net.device(), seed),
            net,
            hidden: vec![0.0; hidden_dim],
        })
    }

    /// Hidden state after the agent's most recent turn.
    pub fn hidden(&self) -> &[f64] {
        &self.hidden
    }
}

impl Policy for RecurrentPpoPolicy {
    fn act(&mut self, observation: &Observation, rng: &mut StdRng) -> Decision {
        self.hidden = self
            .reservoir
            .advance(&self.net, &self.hidden, observation.lesson_features());
        self.net.decide(observation, self.hidden.clone(), rng)
    }

    fn update(&mut self, batch: &RolloutBuffer) -> LossMetrics {
        self.net.update(batch)
    }

    fn begin_episode(&mut self) {
        self.hidden.fill(0.0);
    }

    fn name(&self) -> &str {
        "recurrent-ppo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::rl::training::buffer::Transition;
    use crate::algorithms::rl::training::gae::compute_gae;

    fn env_config() -> RLConfig {
        RLConfig {
            top_m: 2,
            ..RLConfig::default()
        }
    }

    fn obs(duration: f64) -> Observation {
        let mut features = vec![0.0; env_config().observation_dim()];
        features[0] = duration;
        features[4] = 1.0;
        features[RLConfig::LESSON_FEATURE_DIM] = 1.0;
        Observation {
            features,
            n_candidates: 1,
        }
    }

    fn policy() -> RecurrentPpoPolicy {
        RecurrentPpoPolicy::new(&env_config(), TrainingConfig::default(), Device::Cpu, 8).unwrap()
    }

    #[test]
    fn hidden_state_evolves_and_resets() {
        let mut p = policy();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(p.hidden().iter().all(|&h| h == 0.0));
        let d1 = p.act(&obs(0.5), &mut rng);
        let d2 = p.act(&obs(0.5), &mut rng);
        assert_eq!(d1.hidden.len(), TrainingConfig::default().hidden_dim);
        assert_ne!(d1.hidden, d2.hidden);
        assert!(d2.hidden.iter().all(|h| h.abs() < 1.0));
        p.begin_episode();
        assert!(p.hidden().iter().all(|&h| h == 0.0));
        let again = p.act(&obs(0.5), &mut rng);
        assert_eq!(again.hidden, d1.hidden);
    }

    #[test]
    fn update_uses_stored_hidden_states() {
        let mut p = policy();
        let mut rng = StdRng::seed_from_u64(2);
        let mut buf = RolloutBuffer::new();
        for episode in 0..4 {
            p.begin_episode();
            for step in 0..3 {
                let o = obs(0.1 * (step + 1) as f64);
                let d = p.act(&o, &mut rng);
                let reward = if d.action == 0 { -1.0 } else { -(episode as f64) * 0.1 };
                buf.add(Transition::new(o, d, reward));
            }
            buf.end_episode();
        }
        compute_gae(&mut buf, 1.0, 1.0);
        buf.normalize_advantages();
        let hidden_before = p.hidden().to_vec();
        let metrics = p.update(&buf);
        assert!(metrics.is_finite());
        // updating does not advance the recurrent state
        assert_eq!(p.hidden(), hidden_before.as_slice());
    }
}
