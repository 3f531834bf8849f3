//! Observation encoding for the assignment environment.
//!
//! Builds the fixed-shape vector an agent sees when deciding one lesson:
//! the lesson's own features plus features for its top-M candidates.

use super::candidates::{Candidate, CandidateSet};
use super::config::RLConfig;
use super::environment::RLEnvironment;
use crate::Id;

/// Encoded observation of one decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// `[lesson_features(7)] ++ [candidate_1(10)] ++ ... ++ [candidate_M(10)]`
    pub features: Vec<f64>,
    /// Number of candidate slots actually filled (the rest are padding).
    pub n_candidates: usize,
}

impl Observation {
    pub fn lesson_features(&self) -> &[f64] {
        &self.features[..RLConfig::LESSON_FEATURE_DIM]
    }

    /// Features of candidate slot `i` (zero padded if empty).
    pub fn candidate_features(&self, i: usize) -> &[f64] {
        let start = RLConfig::LESSON_FEATURE_DIM + i * RLConfig::CANDIDATE_FEATURE_DIM;
        &self.features[start..start + RLConfig::CANDIDATE_FEATURE_DIM]
    }
}

/// Builds observation vectors for lesson decisions.
pub struct ObservationBuilder;

impl ObservationBuilder {
    /// Builds the observation for deciding `lesson` in the current state.
    ///
    /// The same encoding is used at training and inference time. If fewer
    /// than M candidates are legal, remaining slots are zero-padded.
    ///
    /// # Arguments
    ///
    /// * `env` - Environment in its current state
    /// * `lesson` - Lesson being decided
    /// * `candidates` - Result of [`RLEnvironment::candidates`] for `lesson`
    pub fn build(env: &RLEnvironment, lesson: Id, candidates: &CandidateSet) -> Observation {
        let config = env.config();
        let mut features = Vec::with_capacity(config.observation_dim());
        features.extend(Self::lesson_features(env, lesson, candidates));

        for i in 0..config.top_m {
            match candidates.ranked.get(i) {
                Some(c) => features.extend(Self::candidate_features(env, lesson, c)),
                None => features.resize(features.len() + RLConfig::CANDIDATE_FEATURE_DIM, 0.0),
            }
        }

        Observation {
            features,
            n_candidates: candidates.len().min(config.top_m),
        }
    }

    fn lesson_features(
        env: &RLEnvironment,
        lesson: Id,
        candidates: &CandidateSet,
    ) -> [f64; RLConfig::LESSON_FEATURE_DIM] {
        let problem = env.problem();
        let n_lessons = problem.lessons().len().max(1) as f64;
        let options = env.option_count(lesson);
        let (duration, size) = problem
            .lesson(lesson)
            .map_or((0, 0), |l| (l.duration, l.size));

        [
            duration as f64 / problem.slots_per_day().max(1) as f64,
            ratio(size as f64, problem.max_capacity() as f64),
            ratio(candidates.legal as f64, options as f64),
            ratio(options as f64, env.max_option_count() as f64),
            env.undecided() as f64 / n_lessons,
            env.assignment().len() as f64 / n_lessons,
            env.breakdown().hard_violations() as f64 / n_lessons,
        ]
    }

    fn candidate_features(
        env: &RLEnvironment,
        lesson: Id,
        c: &Candidate,
    ) -> [f64; RLConfig::CANDIDATE_FEATURE_DIM] {
        let problem = env.problem();
        let window = &c.placement.window;
        let size = problem.lesson(lesson).map_or(0, |l| l.size);
        let capacity = problem.room(c.placement.room).map_or(0, |r| r.capacity);
        let n_lessons = problem.lessons().len().max(1) as f64;

        [
            1.0,
            c.delta.hard_violations() as f64,
            squash(c.delta.weighted_soft(env.weights())),
            squash(c.delta.time_preference as f64),
            squash(c.delta.room_preference as f64),
            window.start as f64 / problem.slots_per_day().max(1) as f64,
            window.days.count() as f64 / problem.n_days().max(1) as f64,
            window.weeks.count() as f64 / problem.n_weeks().max(1) as f64,
            ratio(size as f64, capacity as f64),
            env.assignment().room_load(c.placement.room) as f64 / n_lessons,
        ]
    }
}

fn ratio(a: f64, b: f64) -> f64 {
    if b > 0.0 {
        a / b
    } else {
        0.0
    }
}

/// Maps `[0, ∞)` onto `[0, 1)`.
fn squash(x: f64) -> f64 {
    x / (1.0 + x.abs())
}
