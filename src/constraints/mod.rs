//! Constraint rules and penalty scoring.
//!
//! - [`distribution`]: the pairwise distribution rule catalogue
//! - [`evaluator`]: full and incremental [`PenaltyBreakdown`] computation
//! - [`feasibility`]: static detection of unsatisfiable required rules

pub mod distribution;
pub mod evaluator;
pub mod feasibility;

pub use distribution::DistributionKind;
pub use evaluator::{
    evaluate, marginal, EvaluationError, IncrementalEvaluator, PenaltyBreakdown, PenaltyWeights,
};
pub use feasibility::{analyze_feasibility, InfeasibleConstraintWarning};
