//! Reward function for the assignment environment.
//!
//! Agents are rewarded for not worsening the schedule: every reward is the
//! negated penalty an action introduces.

use crate::constraints::{PenaltyBreakdown, PenaltyWeights};

/// Computes rewards for the assignment environment.
pub struct RewardComputer;

impl RewardComputer {
    /// Reward of a legal placement: `-(marginal weighted penalty)`.
    pub fn placement(delta: &PenaltyBreakdown, weights: &PenaltyWeights) -> f64 {
        -delta.weighted(weights)
    }

    /// Extra reward when the step budget runs out: the negated sum of the
    /// unplaced penalties of every undecided lesson.
    pub fn budget_exhausted(penalties: impl IntoIterator<Item = f64>) -> f64 {
        -penalties.into_iter().sum::<f64>()
    }

    /// Mean of the finite values, or `None` if there are none.
    pub fn finite_mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
        let (sum, n) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_reward_is_negated_weighted_penalty() {
        let delta = PenaltyBreakdown {
            required_violations: 1,
            time_preference: 3,
            ..PenaltyBreakdown::default()
        };
        let reward = RewardComputer::placement(&delta, &PenaltyWeights::default());
        assert_eq!(reward, -1003.0);
        assert_eq!(
            RewardComputer::placement(&PenaltyBreakdown::default(), &PenaltyWeights::default()),
            0.0
        );
    }

    #[test]
    fn budget_penalty_sums_lessons() {
        assert_eq!(RewardComputer::budget_exhausted([10.0, 5.0]), -15.0);
        assert_eq!(RewardComputer::budget_exhausted(std::iter::empty()), 0.0);
    }

    #[test]
    fn finite_mean_ignores_nan() {
        assert_eq!(RewardComputer::finite_mean([1.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(RewardComputer::finite_mean([f64::INFINITY]), None);
    }
}
