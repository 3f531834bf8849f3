//! Actor-critic networks using tch-rs (PyTorch bindings).
//!
//! The actor scores each candidate slot with a small MLP over its features
//! plus a linear prior, and the skip action from the lesson features; a
//! softmax over the skip plus the existing candidates gives the action
//! distribution. The critic is an MLP over the whole observation.
//! Recurrent policies add `hᵀ U φ` to every candidate score.
//!
//! This module is only available with the `rl-nn` feature.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::{nn, nn::Module, nn::OptimizerConfig, Device, Kind, TchError, Tensor};

use super::config::{RLConfig, TrainingConfig};
use super::observation::Observation;
use super::policy::{Decision, LossMetrics};
use super::training::buffer::RolloutBuffer;
use super::types::ComputeDevice;

const C: i64 = RLConfig::CANDIDATE_FEATURE_DIM as i64;
const L: i64 = RLConfig::LESSON_FEATURE_DIM as i64;

/// Initial skip bias; skipping starts out unlikely.
const SKIP_BIAS: f64 = -3.0;
/// Initial prior weights on the marginal hard count and soft penalty.
const PRIOR_HARD: f32 = -2.0;
const PRIOR_SOFT: f32 = -1.0;

/// Resolves a configured device. `Gpu` falls back to CPU without CUDA.
pub fn tch_device(device: ComputeDevice) -> Device {
    match device {
        ComputeDevice::Cpu => Device::Cpu,
        ComputeDevice::Gpu => Device::cuda_if_available(),
    }
}

/// Networks, optimizer and the PPO update shared by both PPO policies.
pub(crate) struct ActorCritic {
    vs: nn::VarStore,
    scorer: nn::Sequential,
    prior: nn::Linear,
    skip: nn::Linear,
    critic: nn::Sequential,
    readout: Option<nn::Linear>,
    opt: nn::Optimizer,
    config: TrainingConfig,
    device: Device,
}

impl ActorCritic {
    /// Builds the networks with weights drawn from `seed`.
    ///
    /// `hidden_dim > 0` adds the recurrent readout `U` (`H × C`).
    pub(crate) fn new(
        obs_dim: usize,
        hidden_dim: usize,
        config: TrainingConfig,
        device: Device,
        seed: u64,
    ) -> Result<Self, TchError> {
        let vs = nn::VarStore::new(device);
        let p = &vs.root();
        let scorer = nn::seq()
            .add(nn::linear(p / "scorer" / "l1", C, 64, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(p / "scorer" / "l2", 64, 1, Default::default()));
        let prior = nn::linear(p / "prior", C, 1, Default::default());
        let skip = nn::linear(p / "skip", L, 1, Default::default());
        let critic = nn::seq()
            .add(nn::linear(p / "critic" / "l1", obs_dim as i64, 128, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(p / "critic" / "l2", 128, 64, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(p / "critic" / "l3", 64, 1, Default::default()));
        let readout = (hidden_dim > 0).then(|| {
            nn::linear(
                p / "readout",
                C,
                hidden_dim as i64,
                nn::LinearConfig {
                    bias: false,
                    ..Default::default()
                },
            )
        });

        initialize(&vs, seed);
        tch::no_grad(|| {
            let mut prior_w = prior.ws.shallow_clone();
            let mut w = vec![0f32; C as usize];
            w[1] = PRIOR_HARD;
            w[2] = PRIOR_SOFT;
            prior_w.copy_(&Tensor::from_slice(&w).reshape([1, C]).to_device(device));
            if let Some(bs) = &skip.bs {
                let _ = bs.shallow_clone().fill_(SKIP_BIAS);
            }
        });

        let opt = nn::Adam::default().build(&vs, config.learning_rate)?;
        Ok(Self {
            vs,
            scorer,
            prior,
            skip,
            critic,
            readout,
            opt,
            config,
            device,
        })
    }

    pub(crate) fn device(&self) -> Device {
        self.device
    }

    pub(crate) fn tensor(&self, values: &[f64]) -> Tensor {
        Tensor::from_slice(values)
            .to_kind(Kind::Float)
            .to_device(self.device)
    }

    /// Logits of the legal actions: index 0 is skip, `i` is candidate `i`.
    pub(crate) fn logits(&self, obs: &Observation, hidden: &[f64]) -> Tensor {
        let skip = self.skip.forward(&self.tensor(obs.lesson_features()));
        let n = obs.n_candidates as i64;
        if n == 0 {
            return skip;
        }
        let block = &obs.features[L as usize..(L + n * C) as usize];
        let cands = self.tensor(block).reshape([n, C]);
        let mut scores =
            (self.scorer.forward(&cands) + self.prior.forward(&cands)).squeeze_dim(-1);
        if let Some(readout) = &self.readout {
            if !hidden.is_empty() {
                scores = scores + readout.forward(&cands).mv(&self.tensor(hidden));
            }
        }
        Tensor::cat(&[skip, scores], 0)
    }

    pub(crate) fn value(&self, obs: &Observation) -> Tensor {
        self.critic.forward(&self.tensor(&obs.features)).squeeze()
    }

    pub(crate) fn decide(&self, obs: &Observation, hidden: Vec<f64>, rng: &mut StdRng) -> Decision {
        let (log_probs, value) = tch::no_grad(|| {
            let lp = self.logits(obs, &hidden).log_softmax(0, Kind::Float);
            let n = lp.size()[0];
            let lp: Vec<f64> = (0..n).map(|i| lp.double_value(&[i])).collect();
            (lp, self.value(obs).double_value(&[]))
        });

        let u: f64 = rng.gen();
        let mut acc = 0.0;
        let mut action = log_probs.len() - 1;
        for (k, lp) in log_probs.iter().enumerate() {
            acc += lp.exp();
            if u < acc {
                action = k;
                break;
            }
        }
        Decision {
            action,
            log_prob: log_probs[action],
            value,
            hidden,
        }
    }

    /// PPO update over `n_epochs` full-batch passes.
    ///
    /// On a non-finite loss or gradient the parameters are restored to
    /// their values before the call and `total` is NaN.
    pub(crate) fn update(&mut self, batch: &RolloutBuffer) -> LossMetrics {
        if batch.is_empty() || batch.advantages.len() != batch.len() {
            return LossMetrics::default();
        }
        let snapshot = self.snapshot();
        let passes = self.config.n_epochs.max(1);
        let mut sum = LossMetrics::default();

        for _ in 0..passes {
            let Some((loss, metrics)) = self.loss(batch) else {
                return LossMetrics::default();
            };
            if !metrics.is_finite() {
                self.restore(&snapshot);
                return LossMetrics {
                    total: f64::NAN,
                    ..metrics
                };
            }
            self.opt.zero_grad();
            loss.backward();
            if !self.gradients_finite() {
                self.restore(&snapshot);
                return LossMetrics {
                    total: f64::NAN,
                    ..metrics
                };
            }
            self.opt.clip_grad_norm(self.config.max_grad_norm);
            self.opt.step();
            sum.policy_loss += metrics.policy_loss;
            sum.value_loss += metrics.value_loss;
            sum.entropy += metrics.entropy;
            sum.total += metrics.total;
        }

        let k = passes as f64;
        LossMetrics {
            policy_loss: sum.policy_loss / k,
            value_loss: sum.value_loss / k,
            entropy: sum.entropy / k,
            total: sum.total / k,
        }
    }

    /// Mean clipped-surrogate loss over the batch, with its scalar parts.
    ///
    /// `None` when no transition has an action inside its legal range.
    fn loss(&self, batch: &RolloutBuffer) -> Option<(Tensor, LossMetrics)> {
        let cfg = &self.config;
        let mut surrogate = Vec::with_capacity(batch.len());
        let mut entropy = Vec::with_capacity(batch.len());
        let mut value_error = Vec::with_capacity(batch.len());

        for (t, adv, ret) in batch.samples() {
            let logits = self.logits(&t.observation, &t.hidden);
            if t.action as i64 >= logits.size()[0] {
                continue;
            }
            let log_probs = logits.log_softmax(0, Kind::Float);
            let ratio = (log_probs.get(t.action as i64) - t.log_prob).exp();
            let clipped = ratio.clamp(1.0 - cfg.clip_eps, 1.0 + cfg.clip_eps);
            surrogate.push((&ratio * adv).min_other(&(clipped * adv)));
            entropy.push(-(log_probs.exp() * &log_probs).sum(Kind::Float));
            value_error.push((self.value(&t.observation) - ret).square());
        }
        if surrogate.is_empty() {
            return None;
        }

        let policy_loss = -Tensor::stack(&surrogate, 0).mean(Kind::Float);
        let entropy = Tensor::stack(&entropy, 0).mean(Kind::Float);
        let value_loss = Tensor::stack(&value_error, 0).mean(Kind::Float);
        let total = &policy_loss + cfg.value_coef * &value_loss - cfg.entropy_coef * &entropy;
        let metrics = LossMetrics {
            policy_loss: policy_loss.double_value(&[]),
            value_loss: value_loss.double_value(&[]),
            entropy: entropy.double_value(&[]),
            total: total.double_value(&[]),
        };
        Some((total, metrics))
    }

    fn gradients_finite(&self) -> bool {
        self.vs.trainable_variables().iter().all(|v| {
            let g = v.grad();
            !g.defined() || g.isfinite().all().int64_value(&[]) != 0
        })
    }

    fn snapshot(&self) -> Vec<(String, Tensor)> {
        tch::no_grad(|| {
            sorted_variables(&self.vs)
                .into_iter()
                .map(|(name, v)| (name, v.copy()))
                .collect()
        })
    }

    fn restore(&mut self, snapshot: &[(String, Tensor)]) {
        let vars = self.vs.variables();
        tch::no_grad(|| {
            for (name, saved) in snapshot {
                if let Some(var) = vars.get(name) {
                    var.shallow_clone().copy_(saved);
                }
            }
        });
    }

    /// Flattened copy of every parameter, in name order.
    #[cfg(test)]
    pub(crate) fn parameters(&self) -> Vec<f64> {
        sorted_variables(&self.vs)
            .into_iter()
            .flat_map(|(_, v)| {
                let flat = v.detach().to_kind(Kind::Double).to_device(Device::Cpu).flatten(0, -1);
                let n = flat.size()[0];
                (0..n).map(move |i| flat.double_value(&[i])).collect::<Vec<_>>()
            })
            .collect()
    }
}

fn sorted_variables(vs: &nn::VarStore) -> Vec<(String, Tensor)> {
    let mut vars: Vec<_> = vs.variables().into_iter().collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    vars
}

/// Fills weights uniformly in `±1/√fan_in` from `seed` and zeroes biases,
/// visiting variables in name order so the result never depends on
/// libtorch's global generator.
fn initialize(vs: &nn::VarStore, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    tch::no_grad(|| {
        for (_, mut var) in sorted_variables(vs) {
            let size = var.size();
            let numel: i64 = size.iter().product();
            let values: Vec<f32> = if size.len() == 2 {
                let bound = 1.0 / (size[1] as f32).sqrt();
                (0..numel).map(|_| rng.gen_range(-bound..bound)).collect()
            } else {
                vec![0.0; numel as usize]
            };
            let init = Tensor::from_slice(&values)
                .reshape(size.as_slice())
                .to_device(var.device());
            var.copy_(&init);
        }
    });
}
