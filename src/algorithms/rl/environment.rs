//! Step-wise assignment environment.
//!
//! One episode places (or skips) every lesson of the problem once. Each
//! step targets one undecided lesson and one action from the fixed action
//! space: `0` skips the lesson, `1..=M` picks one of its top-M ranked
//! legal candidates.

use std::sync::Arc;

use thiserror::Error;

use super::candidates::{self, CandidateSet};
use super::config::RLConfig;
use super::reward::RewardComputer;
use crate::constraints::{EvaluationError, IncrementalEvaluator, PenaltyBreakdown, PenaltyWeights};
use crate::problem::Problem;
use crate::schedule::{Assignment, Placement, ScheduleError};
use crate::Id;

/// Lifecycle of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    /// No lesson decided yet.
    Empty,
    /// Some but not all lessons decided.
    InProgress,
    /// Every lesson decided or the step budget is exhausted.
    Terminal,
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    /// The assignment refused a placement that passed the legality check.
    #[error("environment invariant violated placing lesson {lesson}: {source}")]
    Invariant {
        lesson: Id,
        #[source]
        source: ScheduleError,
    },

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// What a step did to the lesson it targeted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Placed(Placement),
    Skipped,
    /// Rejected; the state is unchanged.
    Illegal,
}

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub outcome: StepOutcome,
    pub state: EpisodeState,
    /// Step reward, including unplaced penalties when the step ends the
    /// episode by exhausting the budget.
    pub reward: f64,
    pub done: bool,
}

/// The assignment environment.
///
/// # Lifecycle
///
/// 1. Call [`RLEnvironment::new`] with the problem and configuration.
/// 2. For each lesson turn, call [`RLEnvironment::candidates`] to build the
///    observation, then [`RLEnvironment::step`] with the chosen action.
/// 3. Once `done`, read [`RLEnvironment::terminal_score`] and the assignment.
/// 4. Call [`RLEnvironment::reset`] before the next episode.
#[derive(Debug, Clone)]
pub struct RLEnvironment {
    config: RLConfig,
    weights: PenaltyWeights,
    evaluator: IncrementalEvaluator,
    /// Statically legal placements per lesson position.
    options: Vec<Vec<Placement>>,
    /// Whether each lesson position is placed or skipped.
    decided: Vec<bool>,
    n_decided: usize,
    steps: usize,
    step_budget: usize,
    cumulative_reward: f64,
    state: EpisodeState,
}

impl RLEnvironment {
    /// Creates an environment for one problem.
    ///
    /// # Arguments
    ///
    /// * `problem` - The instance, shared read-only
    /// * `config` - Action space, budget and reward shaping
    /// * `weights` - Penalty weights used for ranking and rewards
    pub fn new(problem: Arc<Problem>, config: RLConfig, weights: PenaltyWeights) -> Self {
        let options = problem
            .lessons()
            .iter()
            .map(|l| problem.placement_options(l))
            .collect();
        let n = problem.lessons().len();
        Self {
            step_budget: config.step_budget(n),
            config,
            weights,
            evaluator: IncrementalEvaluator::new(problem),
            options,
            decided: vec![false; n],
            n_decided: 0,
            steps: 0,
            cumulative_reward: 0.0,
            state: EpisodeState::Empty,
        }
    }

    /// Returns to `Empty`. Keeps the problem and the static option lists.
    pub fn reset(&mut self) {
        self.evaluator.reset();
        self.decided.fill(false);
        self.n_decided = 0;
        self.steps = 0;
        self.cumulative_reward = 0.0;
        self.state = EpisodeState::Empty;
    }

    pub fn problem(&self) -> &Arc<Problem> {
        self.evaluator.problem()
    }

    pub fn config(&self) -> &RLConfig {
        &self.config
    }

    pub fn weights(&self) -> &PenaltyWeights {
        &self.weights
    }

    pub fn state(&self) -> EpisodeState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == EpisodeState::Terminal
    }

    pub fn assignment(&self) -> &Assignment {
        self.evaluator.assignment()
    }

    /// Penalty breakdown of the current assignment.
    pub fn breakdown(&self) -> PenaltyBreakdown {
        self.evaluator.total()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn step_budget(&self) -> usize {
        self.step_budget
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    /// Number of lessons neither placed nor skipped.
    pub fn undecided(&self) -> usize {
        self.decided.len() - self.n_decided
    }

    /// Returns true if the lesson exists and is placed or skipped.
    pub fn is_decided(&self, lesson: Id) -> bool {
        self.problem()
            .lesson_position(lesson)
            .is_some_and(|i| self.decided[i])
    }

    /// Number of statically legal placements of a lesson.
    pub fn option_count(&self, lesson: Id) -> usize {
        self.problem()
            .lesson_position(lesson)
            .map_or(0, |i| self.options[i].len())
    }

    /// Largest static option count over all lessons.
    pub fn max_option_count(&self) -> usize {
        self.options.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Top-M legal candidates of `lesson` in the current state.
    ///
    /// Unknown lessons have no candidates.
    pub fn candidates(&self, lesson: Id) -> Result<CandidateSet, EnvironmentError> {
        let Some(i) = self.problem().lesson_position(lesson) else {
            return Ok(CandidateSet::default());
        };
        Ok(candidates::rank(
            &self.evaluator,
            lesson,
            &self.options[i],
            &self.weights,
            self.config.top_m,
        )?)
    }

    /// Penalty charged when `lesson` ends the episode unplaced.
    pub fn unplaced_penalty(&self, lesson: Id) -> f64 {
        self.problem()
            .lesson(lesson)
            .and_then(|l| l.penalty)
            .unwrap_or(self.config.unplaced_penalty)
    }

    /// Lessons not in the assignment, ascending by id.
    pub fn unplaced(&self) -> Vec<Id> {
        self.problem()
            .lessons()
            .iter()
            .map(|l| l.id)
            .filter(|&id| !self.assignment().contains_lesson(id))
            .collect()
    }

    /// Weighted penalty of the assignment plus the unplaced penalties.
    pub fn terminal_score(&self) -> f64 {
        let unplaced: f64 = self.unplaced().iter().map(|&l| self.unplaced_penalty(l)).sum();
        self.breakdown().weighted(&self.weights) + unplaced
    }

    /// Applies `action` to `lesson`.
    ///
    /// Every call consumes one step of the budget, rejected ones included.
    ///
    /// # Errors
    ///
    /// `Invariant` if the assignment reports a double booking for a
    /// candidate that passed the legality check. The run must stop.
    pub fn step(&mut self, lesson: Id, action: usize) -> Result<StepResult, EnvironmentError> {
        if self.is_done() {
            return Ok(self.rejected());
        }
        self.steps += 1;

        let position = self
            .problem()
            .lesson_position(lesson)
            .filter(|&i| !self.decided[i]);

        let (outcome, mut reward) = match position {
            None => (StepOutcome::Illegal, -self.config.illegal_action_penalty),
            Some(i) if action == 0 => {
                self.decide(i);
                (StepOutcome::Skipped, -self.unplaced_penalty(lesson))
            }
            Some(i) => match self.candidates(lesson)?.for_action(action) {
                None => (StepOutcome::Illegal, -self.config.illegal_action_penalty),
                Some(candidate) => {
                    let placement = candidate.placement;
                    let delta = self.evaluator.place(lesson, placement).map_err(|e| match e {
                        EvaluationError::Schedule(source) => {
                            EnvironmentError::Invariant { lesson, source }
                        }
                        other => EnvironmentError::Evaluation(other),
                    })?;
                    self.decide(i);
                    (
                        StepOutcome::Placed(placement),
                        RewardComputer::placement(&delta, &self.weights),
                    )
                }
            },
        };

        if self.n_decided == self.decided.len() {
            self.state = EpisodeState::Terminal;
        } else if self.steps >= self.step_budget {
            self.state = EpisodeState::Terminal;
            let pending: Vec<Id> = self
                .problem()
                .lessons()
                .iter()
                .zip(&self.decided)
                .filter(|(_, &d)| !d)
                .map(|(l, _)| l.id)
                .collect();
            reward += RewardComputer::budget_exhausted(pending.iter().map(|&l| self.unplaced_penalty(l)));
        }

        self.cumulative_reward += reward;
        Ok(StepResult {
            outcome,
            state: self.state,
            reward,
            done: self.is_done(),
        })
    }

    fn decide(&mut self, position: usize) {
        self.decided[position] = true;
        self.n_decided += 1;
        self.state = EpisodeState::InProgress;
    }

    fn rejected(&self) -> StepResult {
        StepResult {
            outcome: StepOutcome::Illegal,
            state: self.state,
            reward: -self.config.illegal_action_penalty,
            done: self.is_done(),
        }
    }
}
