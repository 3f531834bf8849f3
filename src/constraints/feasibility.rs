//! Static detection of required distributions no placement can satisfy.
//!
//! The analysis is conservative: it reports only what it can prove from the
//! problem alone. A clean report does not mean the instance is feasible.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use super::DistributionKind;
use crate::problem::Problem;
use crate::schedule::Placement;
use crate::Id;

/// Pairs of candidate lists larger than this are not brute-forced.
pub const MAX_PAIR_CHECKS: usize = 10_000;

/// A hard constraint that cannot be met. Non-fatal: the optimizer still
/// produces a best-effort schedule and the violation shows up as a penalty.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "warning")]
pub enum InfeasibleConstraintWarning {
    #[error("required precedence distributions {distributions:?} form a cycle over lessons {lessons:?}")]
    PrecedenceCycle {
        distributions: Vec<Id>,
        lessons: Vec<Id>,
    },

    #[error("required {rule} distribution {distribution} cannot hold for lessons {first} and {second}")]
    UnsatisfiablePair {
        distribution: Id,
        rule: DistributionKind,
        first: Id,
        second: Id,
    },

    #[error("lesson {lesson} has no permitted room and time slot combination")]
    NoPlacement { lesson: Id },
}

/// Runs every static check and logs each finding at `warn`.
pub fn analyze_feasibility(problem: &Problem) -> Vec<InfeasibleConstraintWarning> {
    let options: HashMap<Id, Vec<Placement>> = problem
        .lessons()
        .iter()
        .map(|l| (l.id, problem.placement_options(l)))
        .collect();

    let mut warnings = Vec::new();
    for lesson in problem.lessons() {
        if options.get(&lesson.id).map_or(true, Vec::is_empty) {
            warnings.push(InfeasibleConstraintWarning::NoPlacement { lesson: lesson.id });
        }
    }
    warnings.extend(precedence_cycles(problem));
    warnings.extend(unsatisfiable_pairs(problem, &options));

    for w in &warnings {
        warn!(instance = problem.name(), "{w}");
    }
    warnings
}

/// Strongly connected components of the required precedence graph.
fn precedence_cycles(problem: &Problem) -> Vec<InfeasibleConstraintWarning> {
    let mut graph: DiGraph<Id, Id> = DiGraph::new();
    let mut node_by_id: HashMap<Id, NodeIndex> = HashMap::new();

    for d in problem.distributions() {
        if !d.required || d.kind != DistributionKind::Precedence {
            continue;
        }
        for pair in d.lessons.windows(2) {
            let [from, to] = [pair[0], pair[1]].map(|id| {
                *node_by_id
                    .entry(id)
                    .or_insert_with(|| graph.add_node(id))
            });
            graph.add_edge(from, to, d.id);
        }
    }

    let mut warnings = Vec::new();
    for component in tarjan_scc(&graph) {
        if component.len() < 2 {
            continue;
        }
        let members: BTreeSet<NodeIndex> = component.iter().copied().collect();
        let lessons: BTreeSet<Id> = component.iter().map(|&n| graph[n]).collect();
        let distributions: BTreeSet<Id> = graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = graph.edge_endpoints(e)?;
                (members.contains(&a) && members.contains(&b)).then(|| graph[e])
            })
            .collect();
        warnings.push(InfeasibleConstraintWarning::PrecedenceCycle {
            distributions: distributions.into_iter().collect(),
            lessons: lessons.into_iter().collect(),
        });
    }
    warnings
}

/// Required pairs for which no two candidate placements work together.
fn unsatisfiable_pairs(
    problem: &Problem,
    options: &HashMap<Id, Vec<Placement>>,
) -> Vec<InfeasibleConstraintWarning> {
    let mut warnings = Vec::new();
    for d in problem.distributions() {
        if !d.required {
            continue;
        }
        for (i, &first) in d.lessons.iter().enumerate() {
            for &second in &d.lessons[i + 1..] {
                let (Some(a), Some(b)) = (options.get(&first), options.get(&second)) else {
                    continue;
                };
                if a.is_empty() || b.is_empty() || a.len() * b.len() > MAX_PAIR_CHECKS {
                    continue;
                }
                let satisfiable = a.iter().any(|pa| {
                    b.iter().any(|pb| {
                        let clash = pa.room == pb.room && pa.window.overlaps(&pb.window);
                        !clash
                            && d.kind.pair_satisfied(pa, pb, problem.travel(pa.room, pb.room))
                    })
                });
                if !satisfiable {
                    warnings.push(InfeasibleConstraintWarning::UnsatisfiablePair {
                        distribution: d.id,
                        rule: d.kind,
                        first,
                        second,
                    });
                }
            }
        }
    }
    warnings
}
