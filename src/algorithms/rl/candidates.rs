//! Ranked legal placements for the lesson being decided.

use std::cmp::Ordering;

use crate::constraints::{EvaluationError, IncrementalEvaluator, PenaltyBreakdown, PenaltyWeights};
use crate::schedule::Placement;
use crate::Id;

/// A legal placement together with the penalty it would add.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub placement: Placement,
    /// Marginal breakdown from [`IncrementalEvaluator::preview`].
    pub delta: PenaltyBreakdown,
    /// `delta` weighted by the run's penalty weights.
    pub score: f64,
}

/// The top-M candidates of a lesson plus the size of the full legal set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    /// Best first; index `i` is selected by action `i + 1`.
    pub ranked: Vec<Candidate>,
    /// Number of legal placements before truncation.
    pub legal: usize,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Candidate selected by `action`, if any. Action 0 is skip.
    pub fn for_action(&self, action: usize) -> Option<&Candidate> {
        action.checked_sub(1).and_then(|i| self.ranked.get(i))
    }
}

/// Ranks the statically legal `options` of `lesson` that are free in the
/// current assignment.
///
/// `options` must be in ascending slot id then room id order; the sort is
/// stable so equal scores keep that first-fit order.
pub fn rank(
    evaluator: &IncrementalEvaluator,
    lesson: Id,
    options: &[Placement],
    weights: &PenaltyWeights,
    top_m: usize,
) -> Result<CandidateSet, EvaluationError> {
    let assignment = evaluator.assignment();
    let mut ranked = Vec::new();
    for placement in options {
        if !assignment.is_free(placement.room, &placement.window) {
            continue;
        }
        let delta = evaluator.preview(lesson, placement)?;
        ranked.push(Candidate {
            placement: *placement,
            delta,
            score: delta.weighted(weights),
        });
    }
    let legal = ranked.len();
    ranked.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
    ranked.truncate(top_m);
    Ok(CandidateSet { ranked, legal })
}
