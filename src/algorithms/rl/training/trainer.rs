//! Epoch loop: rollouts, per-agent PPO updates, best-assignment tracking
//! and progress reporting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, trace, warn};

use super::buffer::Transition;
use super::gae::compute_gae;
use crate::algorithms::rl::agent::AgentPool;
use crate::algorithms::rl::config::{RLConfig, TrainingConfig};
use crate::algorithms::rl::environment::{EnvironmentError, RLEnvironment, StepOutcome};
use crate::algorithms::rl::observation::ObservationBuilder;
use crate::algorithms::rl::reward::RewardComputer;
use crate::algorithms::rl::types::{ComputeDevice, Method, PartitionId};
use crate::constraints::{analyze_feasibility, InfeasibleConstraintWarning, PenaltyBreakdown, PenaltyWeights};
use crate::problem::Problem;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::schedule::{Assignment, PlacementRecord};
use crate::Id;

/// Cooperative cancellation flag, checked at epoch boundaries.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run decides before training starts.
#[derive(Debug, Clone)]
pub struct TrainerSetup {
    pub method: Method,
    pub seed: u64,
    pub quickrun: bool,
    pub environment: RLConfig,
    pub training: TrainingConfig,
    pub penalties: PenaltyWeights,
    pub device: ComputeDevice,
}

impl TrainerSetup {
    /// Default hyperparameters for `method`.
    pub fn new(method: Method, seed: u64) -> Self {
        Self {
            method,
            seed,
            quickrun: false,
            environment: RLConfig::default(),
            training: TrainingConfig::default(),
            penalties: PenaltyWeights::default(),
            device: ComputeDevice::default(),
        }
    }
}

/// An agent's update produced a non-finite loss. Its parameters were left
/// unchanged and the epoch is marked degraded.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("non-finite loss {loss} for agent {agent} in epoch {epoch}")]
pub struct NumericInstabilityWarning {
    pub epoch: u32,
    pub agent: PartitionId,
    pub loss: f64,
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// The method needs a feature this build was compiled without
    #[error("method {0} is not available in this build (enable the `rl-nn` feature)")]
    MethodUnavailable(Method),

    #[cfg(feature = "rl-nn")]
    #[error("network setup failed: {0}")]
    Network(#[from] tch::TchError),
}

/// Per-epoch record kept in the outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochSummary {
    pub epoch: u32,
    pub loss: f64,
    pub reward: f64,
    pub best_score: Option<f64>,
    pub best_hard: Option<u32>,
    pub degraded: bool,
}

/// Best terminal assignment seen so far.
///
/// Ordered by `hard` (hard violations plus unplaced lessons), then by
/// `score`.
#[derive(Debug, Clone, Serialize)]
pub struct BestAssignment {
    pub epoch: u32,
    pub score: f64,
    pub hard: u32,
    pub breakdown: PenaltyBreakdown,
    pub unplaced: Vec<Id>,
    pub records: Vec<PlacementRecord>,
    #[serde(skip)]
    pub assignment: Assignment,
}

impl BestAssignment {
    fn improves_on(&self, other: &BestAssignment) -> bool {
        self.hard < other.hard || (self.hard == other.hard && self.score < other.score)
    }
}

/// Result of a training run, complete or cancelled.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub method: Method,
    pub epochs: Vec<EpochSummary>,
    pub best: Option<BestAssignment>,
    pub warnings: Vec<InfeasibleConstraintWarning>,
    pub numeric_warnings: Vec<NumericInstabilityWarning>,
    pub cancelled: bool,
}

/// Drives one run: owns the environment, the agent pool and the episode
/// RNG, and reports one [`ProgressEvent`] per completed epoch.
pub struct Trainer {
    problem: Arc<Problem>,
    setup: TrainerSetup,
    env: RLEnvironment,
    pool: AgentPool,
    rng: StdRng,
    reporter: Arc<dyn ProgressReporter>,
    stop: StopSignal,
}

impl Trainer {
    /// # Errors
    ///
    /// `MethodUnavailable` for a learning method without the `rl-nn`
    /// feature, `Network` when libtorch refuses to build a policy.
    pub fn new(
        problem: Arc<Problem>,
        setup: TrainerSetup,
        reporter: Arc<dyn ProgressReporter>,
        stop: StopSignal,
    ) -> Result<Self, TrainingError> {
        let env = RLEnvironment::new(problem.clone(), setup.environment.clone(), setup.penalties);
        let pool = AgentPool::new(
            &problem,
            setup.method,
            &setup.environment,
            &setup.training,
            setup.device,
            setup.seed,
        )?;
        Ok(Self {
            rng: StdRng::seed_from_u64(setup.seed),
            problem,
            setup,
            env,
            pool,
            reporter,
            stop,
        })
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Runs every epoch, or until the stop signal is observed.
    ///
    /// # Errors
    ///
    /// `TrainingError::Environment` when the environment reports a broken
    /// invariant; the run is aborted.
    pub fn run(&mut self) -> Result<TrainingOutcome, TrainingError> {
        let warnings = analyze_feasibility(&self.problem);
        let (epochs, episodes) = self.setup.training.schedule(self.setup.quickrun);
        info!(
            method = %self.setup.method,
            agents = self.pool.len(),
            lessons = self.problem.lessons().len(),
            epochs,
            episodes,
            "training started"
        );

        let mut summaries = Vec::new();
        let mut best: Option<BestAssignment> = None;
        let mut numeric_warnings = Vec::new();
        let mut cancelled = false;

        for epoch in 0..epochs {
            let span = info_span!("epoch", index = epoch);
            let _enter = span.enter();

            if self.stop.is_stopped() {
                cancelled = true;
                break;
            }

            let mut degraded = false;
            let mut rewards = Vec::new();
            for _ in 0..episodes {
                let reward = self.run_episode()?;
                if !reward.is_finite() {
                    warn!(reward, "non-finite episode reward");
                    degraded = true;
                }
                rewards.push(reward);
                self.track_best(epoch, &mut best);
            }

            let mut losses = Vec::with_capacity(self.pool.len());
            for warning in self.update_agents(epoch, &mut losses) {
                warn!(agent = warning.agent, loss = warning.loss, "{warning}");
                numeric_warnings.push(warning);
                degraded = true;
            }

            let loss = RewardComputer::finite_mean(losses).unwrap_or(0.0);
            let reward = RewardComputer::finite_mean(rewards).unwrap_or(0.0);

            if self.stop.is_stopped() {
                cancelled = true;
                break;
            }

            self.reporter.report(ProgressEvent::new(epoch, loss, reward));
            let summary = EpochSummary {
                epoch,
                loss,
                reward,
                best_score: best.as_ref().map(|b| b.score),
                best_hard: best.as_ref().map(|b| b.hard),
                degraded,
            };
            debug!(
                loss,
                reward,
                best_score = summary.best_score,
                best_hard = summary.best_hard,
                degraded,
                "epoch finished"
            );
            summaries.push(summary);
        }

        if cancelled {
            info!(completed = summaries.len(), "training cancelled");
        } else if let Some(b) = &best {
            info!(score = b.score, hard = b.hard, unplaced = b.unplaced.len(), "training finished");
        }

        Ok(TrainingOutcome {
            method: self.setup.method,
            epochs: summaries,
            best,
            warnings,
            numeric_warnings,
            cancelled,
        })
    }

    /// Plays one episode in turn order. Returns the raw episode reward.
    fn run_episode(&mut self) -> Result<f64, TrainingError> {
        self.env.reset();
        self.pool.begin_episode();
        let scale = self.setup.training.reward_scale;

        while !self.env.is_done() {
            let turns = self.pool.round(&self.env);
            if turns.is_empty() {
                break;
            }
            for (partition, lesson) in turns {
                if self.env.is_done() {
                    break;
                }
                let candidates = self.env.candidates(lesson)?;
                let observation = ObservationBuilder::build(&self.env, lesson, &candidates);
                let agent = &mut self.pool.agents_mut()[partition];
                let decision = agent.policy.act(&observation, &mut self.rng);
                let action = decision.action;
                let result = self.env.step(lesson, action)?;
                if result.outcome == StepOutcome::Illegal {
                    trace!(lesson, action, "illegal action");
                }
                agent
                    .buffer
                    .add(Transition::new(observation, decision, result.reward * scale));
            }
        }

        for agent in self.pool.agents_mut() {
            agent.buffer.end_episode();
        }
        Ok(self.env.cumulative_reward())
    }

    fn track_best(&self, epoch: u32, best: &mut Option<BestAssignment>) {
        let breakdown = self.env.breakdown();
        let unplaced = self.env.unplaced();
        let candidate = BestAssignment {
            epoch,
            score: self.env.terminal_score(),
            hard: breakdown.hard_violations() + unplaced.len() as u32,
            breakdown,
            unplaced,
            records: self.env.assignment().records(),
            assignment: self.env.assignment().clone(),
        };
        if best.as_ref().map_or(true, |b| candidate.improves_on(b)) {
            debug!(score = candidate.score, hard = candidate.hard, "new best assignment");
            *best = Some(candidate);
        }
    }

    /// Updates every agent from its epoch buffer, then clears the buffers.
    fn update_agents(&mut self, epoch: u32, losses: &mut Vec<f64>) -> Vec<NumericInstabilityWarning> {
        let (gamma, lambda) = (self.setup.training.gamma, self.setup.training.gae_lambda);
        let mut warnings = Vec::new();
        for agent in self.pool.agents_mut() {
            if agent.buffer.is_empty() {
                continue;
            }
            compute_gae(&mut agent.buffer, gamma, lambda);
            agent.buffer.normalize_advantages();
            let metrics = agent.policy.update(&agent.buffer);
            if metrics.is_finite() {
                trace!(
                    agent = agent.partition,
                    policy_loss = metrics.policy_loss,
                    value_loss = metrics.value_loss,
                    entropy = metrics.entropy,
                    "agent updated"
                );
                losses.push(metrics.total);
            } else {
                warnings.push(NumericInstabilityWarning {
                    epoch,
                    agent: agent.partition,
                    loss: metrics.total,
                });
            }
        }
        self.pool.clear_buffers();
        warnings
    }
}
