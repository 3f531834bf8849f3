//! Penalty evaluation of partial or complete assignments.
//!
//! [`evaluate`] rescans a whole assignment. [`IncrementalEvaluator`] keeps
//! the same breakdown up to date while lessons are placed one at a time;
//! each placement costs time proportional to the lessons sharing its room
//! plus the lessons sharing a distribution with it.

use std::ops::{Add, AddAssign};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::problem::{Lesson, Problem};
use crate::schedule::{Assignment, Placement, ScheduleError};
use crate::Id;

/// Weights turning a [`PenaltyBreakdown`] into a single score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PenaltyWeights {
    /// Weight of one hard violation.
    pub hard: f64,
    /// Weight of one unit of time preference penalty.
    pub time: f64,
    /// Weight of one unit of room preference penalty.
    pub room: f64,
    /// Multiplier of the soft distribution penalty.
    pub distribution: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            hard: 1000.0,
            time: 1.0,
            room: 1.0,
            distribution: 1.0,
        }
    }
}

/// Hard violation counts and soft penalty sums of an assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PenaltyBreakdown {
    /// Pairs of lessons double-booking a room.
    pub room_conflicts: u32,
    /// Room not permitted, too small or unavailable.
    pub room_violations: u32,
    /// Time slot not permitted or the lesson does not fit it.
    pub time_violations: u32,
    /// Violating pairs of required distributions.
    pub required_violations: u32,
    /// Weighted violating pairs of soft distributions.
    pub soft_distribution: f64,
    pub room_preference: u64,
    pub time_preference: u64,
}

impl PenaltyBreakdown {
    /// Total number of hard violations.
    pub fn hard_violations(&self) -> u32 {
        self.room_conflicts + self.room_violations + self.time_violations + self.required_violations
    }

    /// Single scalar score; lower is better.
    pub fn weighted(&self, weights: &PenaltyWeights) -> f64 {
        self.hard_violations() as f64 * weights.hard
            + self.time_preference as f64 * weights.time
            + self.room_preference as f64 * weights.room
            + self.soft_distribution * weights.distribution
    }

    /// Soft part of the weighted score.
    pub fn weighted_soft(&self, weights: &PenaltyWeights) -> f64 {
        self.weighted(weights) - self.hard_violations() as f64 * weights.hard
    }
}

impl AddAssign for PenaltyBreakdown {
    fn add_assign(&mut self, rhs: Self) {
        self.room_conflicts += rhs.room_conflicts;
        self.room_violations += rhs.room_violations;
        self.time_violations += rhs.time_violations;
        self.required_violations += rhs.required_violations;
        self.soft_distribution += rhs.soft_distribution;
        self.room_preference += rhs.room_preference;
        self.time_preference += rhs.time_preference;
    }
}

impl Add for PenaltyBreakdown {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// Placement refers to a lesson the problem does not define
    #[error("Lesson {0} is not part of the problem")]
    UnknownLesson(Id),

    /// Marginal cost asked for a lesson that is already placed
    #[error("Lesson {0} is already placed")]
    AlreadyPlaced(Id),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Penalties that depend on one lesson's placement alone.
fn placement_penalty(problem: &Problem, lesson: &Lesson, placement: &Placement) -> PenaltyBreakdown {
    let mut b = PenaltyBreakdown::default();

    match lesson.room_penalty(placement.room) {
        Some(p) => b.room_preference += u64::from(p),
        None => b.room_violations += 1,
    }
    match problem.room(placement.room) {
        Some(room) => {
            if room.capacity < lesson.size {
                b.room_violations += 1;
            }
            if !room.is_available(&placement.window) {
                b.room_violations += 1;
            }
        }
        None => b.room_violations += 1,
    }

    match lesson.time_penalty(placement.slot) {
        Some(p) => b.time_preference += u64::from(p),
        None => b.time_violations += 1,
    }
    match problem.time_slot(placement.slot) {
        Some(slot) if slot.fits(lesson.duration) => {}
        _ => b.time_violations += 1,
    }

    b
}

/// Soft distribution penalty from per-distribution violation counts.
///
/// Summed in distribution order so the result does not depend on the order
/// in which violations were found.
fn soft_penalty(problem: &Problem, counts: &[u32]) -> f64 {
    problem
        .distributions()
        .iter()
        .zip(counts)
        .filter(|(_, n)| **n > 0)
        .fold(0.0, |acc, (d, &n)| acc + f64::from(n) * d.penalty)
}

/// Scores `assignment` from scratch.
///
/// Deterministic: room conflicts are counted once per overlapping pair and
/// distribution pairs are visited in list order.
pub fn evaluate(
    problem: &Problem,
    assignment: &Assignment,
) -> Result<PenaltyBreakdown, EvaluationError> {
    let mut total = PenaltyBreakdown::default();

    for (id, placement) in assignment.iter() {
        let lesson = problem.lesson(id).ok_or(EvaluationError::UnknownLesson(id))?;
        total += placement_penalty(problem, lesson, placement);
    }

    for room in problem.rooms() {
        let entries: Vec<_> = assignment.room_entries(room.id).collect();
        for (i, (_, a)) in entries.iter().enumerate() {
            for (_, b) in &entries[i + 1..] {
                if a.overlaps(b) {
                    total.room_conflicts += 1;
                }
            }
        }
    }

    let mut soft_counts = vec![0u32; problem.distributions().len()];
    for (d_idx, d) in problem.distributions().iter().enumerate() {
        for (i, &a) in d.lessons.iter().enumerate() {
            let Some(pa) = assignment.get(a) else {
                continue;
            };
            for &b in &d.lessons[i + 1..] {
                let Some(pb) = assignment.get(b) else {
                    continue;
                };
                if !d.kind.pair_satisfied(pa, pb, problem.travel(pa.room, pb.room)) {
                    if d.required {
                        total.required_violations += 1;
                    } else {
                        soft_counts[d_idx] += 1;
                    }
                }
            }
        }
    }
    total.soft_distribution = soft_penalty(problem, &soft_counts);

    Ok(total)
}

/// Penalty added by placing `lesson` at `placement` on top of `assignment`.
///
/// `assignment` must not already contain the lesson.
pub fn marginal(
    problem: &Problem,
    assignment: &Assignment,
    lesson: Id,
    placement: &Placement,
) -> Result<PenaltyBreakdown, EvaluationError> {
    marginal_with(problem, assignment, lesson, placement, |_| {})
}

/// [`marginal`], reporting the index of every violated soft distribution
/// pair to `on_soft`.
fn marginal_with(
    problem: &Problem,
    assignment: &Assignment,
    lesson: Id,
    placement: &Placement,
    mut on_soft: impl FnMut(usize),
) -> Result<PenaltyBreakdown, EvaluationError> {
    let l = problem
        .lesson(lesson)
        .ok_or(EvaluationError::UnknownLesson(lesson))?;
    if assignment.contains_lesson(lesson) {
        return Err(EvaluationError::AlreadyPlaced(lesson));
    }

    let mut delta = placement_penalty(problem, l, placement);
    delta.room_conflicts += assignment.conflicts(placement.room, &placement.window).count() as u32;

    for (d_idx, d) in problem.distributions_of(lesson) {
        let Some(own) = d.lessons.iter().position(|&x| x == lesson) else {
            continue;
        };
        for (pos, &other) in d.lessons.iter().enumerate() {
            if pos == own {
                continue;
            }
            let Some(po) = assignment.get(other) else {
                continue;
            };
            let travel = problem.travel(placement.room, po.room);
            let satisfied = if pos < own {
                d.kind.pair_satisfied(po, placement, travel)
            } else {
                d.kind.pair_satisfied(placement, po, travel)
            };
            if !satisfied {
                if d.required {
                    delta.required_violations += 1;
                } else {
                    delta.soft_distribution += d.penalty;
                    on_soft(d_idx);
                }
            }
        }
    }

    Ok(delta)
}

/// Running penalty of an assignment built one placement at a time.
///
/// Owns the assignment so the running total can never drift from it.
#[derive(Debug, Clone)]
pub struct IncrementalEvaluator {
    problem: Arc<Problem>,
    assignment: Assignment,
    total: PenaltyBreakdown,
    /// Violating pairs per soft distribution, indexed like
    /// [`Problem::distributions`].
    soft_counts: Vec<u32>,
}

impl IncrementalEvaluator {
    pub fn new(problem: Arc<Problem>) -> Self {
        let soft_counts = vec![0; problem.distributions().len()];
        Self {
            problem,
            assignment: Assignment::new(),
            total: PenaltyBreakdown::default(),
            soft_counts,
        }
    }

    pub fn problem(&self) -> &Arc<Problem> {
        &self.problem
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    /// Breakdown of everything placed so far.
    pub fn total(&self) -> PenaltyBreakdown {
        self.total
    }

    /// Marginal breakdown of a placement, without committing it.
    pub fn preview(
        &self,
        lesson: Id,
        placement: &Placement,
    ) -> Result<PenaltyBreakdown, EvaluationError> {
        marginal(&self.problem, &self.assignment, lesson, placement)
    }

    /// Commits a placement and returns its marginal breakdown.
    ///
    /// # Errors
    ///
    /// - `UnknownLesson` / `AlreadyPlaced` from the marginal computation
    /// - `Schedule` if the assignment refuses the placement (double booking)
    pub fn place(
        &mut self,
        lesson: Id,
        placement: Placement,
    ) -> Result<PenaltyBreakdown, EvaluationError> {
        let mut violated = Vec::new();
        let delta = marginal_with(&self.problem, &self.assignment, lesson, &placement, |d| {
            violated.push(d)
        })?;
        self.assignment.add(lesson, placement)?;
        for d in violated {
            self.soft_counts[d] += 1;
        }
        self.total += delta;
        self.total.soft_distribution = soft_penalty(&self.problem, &self.soft_counts);
        Ok(delta)
    }

    /// Empties the assignment and zeroes the total.
    pub fn reset(&mut self) {
        self.assignment.clear();
        self.total = PenaltyBreakdown::default();
        self.soft_counts.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::fixtures;
    use serde_json::json;

    fn place_at(problem: &Problem, lesson: Id, slot: Id, room: Id) -> Placement {
        let duration = problem.lesson(lesson).unwrap().duration;
        Placement {
            room,
            slot,
            window: problem.time_slot(slot).unwrap().window_for(duration),
        }
    }

    fn scored() -> Problem {
        fixtures::problem(json!({
            "name": "scored",
            "slots_per_day": 24, "n_days": 2, "n_weeks": 1,
            "rooms": [
                {"id": 1, "capacity": 10, "travel": [{"room": 2, "value": 2}]},
                {"id": 2, "capacity": 40}
            ],
            "time_slots": [
                {"id": 1, "days": "10", "weeks": "1", "start": 0, "length": 4},
                {"id": 2, "days": "10", "weeks": "1", "start": 4, "length": 4},
                {"id": 3, "days": "01", "weeks": "1", "start": 0, "length": 4}
            ],
            "lessons": [
                {"id": 1, "duration": 4, "size": 5,
                 "rooms": [{"room": 1, "penalty": 2}, {"room": 2, "penalty": 0}],
                 "times": [{"slot": 1, "penalty": 3}, {"slot": 2}]},
                {"id": 2, "duration": 4, "size": 20},
                {"id": 3, "duration": 4, "size": 5}
            ],
            "distributions": [
                {"id": 1, "kind": "SameAttendees", "lessons": [1, 2], "penalty": 7.0},
                {"id": 2, "kind": "Precedence", "lessons": [3, 1], "required": true},
                {"id": 3, "kind": "SameRoom", "lessons": [1, 2, 3], "penalty": 1.0}
            ]
        }))
    }

    #[test]
    fn empty_assignment_scores_zero() {
        let p = scored();
        let b = evaluate(&p, &Assignment::new()).unwrap();
        assert_eq!(b, PenaltyBreakdown::default());
        assert_eq!(b.weighted(&PenaltyWeights::default()), 0.0);
    }

    #[test]
    fn static_checks_are_counted() {
        let p = scored();
        // lesson 2 (20 attendees) in room 1 (capacity 10)
        let a = Assignment::from_placements([(2, place_at(&p, 2, 3, 1))]);
        assert_eq!(evaluate(&p, &a).unwrap().room_violations, 1);
        // lesson 1 in slot 3 is not permitted
        let a = Assignment::from_placements([(1, place_at(&p, 1, 3, 2))]);
        assert_eq!(evaluate(&p, &a).unwrap().time_violations, 1);
    }

    #[test]
    fn preferences_and_distributions() {
        let p = scored();
        let a = Assignment::from_placements([
            (1, place_at(&p, 1, 1, 1)),
            (2, place_at(&p, 2, 2, 2)),
        ]);
        let b = evaluate(&p, &a).unwrap();
        assert_eq!(b.room_preference, 2);
        assert_eq!(b.time_preference, 3);
        // back to back with travel 2: SameAttendees(7) and SameRoom(1) violated
        assert_eq!(b.soft_distribution, 8.0);
        assert_eq!(b.hard_violations(), 0);
        let w = PenaltyWeights::default();
        assert_eq!(b.weighted(&w), 2.0 + 3.0 + 8.0);
    }

    #[test]
    fn room_conflicts_count_pairs() {
        let p = scored();
        let a = Assignment::from_placements([
            (1, place_at(&p, 1, 1, 2)),
            (2, place_at(&p, 2, 1, 2)),
            (3, place_at(&p, 3, 1, 2)),
        ]);
        let b = evaluate(&p, &a).unwrap();
        assert_eq!(b.room_conflicts, 3);
    }

    #[test]
    fn required_precedence_violation_is_hard() {
        let p = scored();
        let a = Assignment::from_placements([
            (1, place_at(&p, 1, 1, 2)),
            (3, place_at(&p, 3, 2, 2)),
        ]);
        let b = evaluate(&p, &a).unwrap();
        assert_eq!(b.required_violations, 1);
        assert_eq!(b.hard_violations(), 1);
    }

    #[test]
    fn unknown_lesson_is_an_error() {
        let p = scored();
        let a = Assignment::from_placements([(99, place_at(&p, 1, 1, 1))]);
        assert_eq!(evaluate(&p, &a), Err(EvaluationError::UnknownLesson(99)));
    }

    #[test]
    fn evaluate_is_deterministic() {
        let p = scored();
        let a = Assignment::from_placements([
            (1, place_at(&p, 1, 2, 1)),
            (2, place_at(&p, 2, 1, 2)),
            (3, place_at(&p, 3, 3, 1)),
        ]);
        let first = evaluate(&p, &a).unwrap();
        for _ in 0..5 {
            assert_eq!(evaluate(&p, &a).unwrap(), first);
        }
    }

    #[test]
    fn incremental_matches_full_evaluation() {
        let p = Arc::new(scored());
        let orders: [&[(Id, Id, Id)]; 3] = [
            &[(1, 1, 1), (2, 2, 2), (3, 3, 1)],
            &[(3, 2, 2), (2, 3, 2), (1, 1, 2)],
            &[(2, 1, 2), (1, 2, 1), (3, 1, 1)],
        ];
        for order in orders {
            let mut inc = IncrementalEvaluator::new(p.clone());
            for &(lesson, slot, room) in order {
                inc.place(lesson, place_at(&p, lesson, slot, room)).unwrap();
                assert_eq!(inc.total(), evaluate(&p, inc.assignment()).unwrap());
            }
        }
    }

    #[test]
    fn incremental_soft_sum_is_exact() {
        // 0.1 + 0.2 + 0.7 accumulates differently depending on order
        let p = Arc::new(fixtures::problem(json!({
            "name": "fractional",
            "slots_per_day": 24, "n_days": 1, "n_weeks": 1,
            "rooms": [
                {"id": 1, "capacity": 10},
                {"id": 2, "capacity": 10},
                {"id": 3, "capacity": 10}
            ],
            "time_slots": [
                {"id": 1, "days": "1", "weeks": "1", "start": 0, "length": 4}
            ],
            "lessons": [
                {"id": 1, "duration": 4, "size": 1},
                {"id": 2, "duration": 4, "size": 1},
                {"id": 3, "duration": 4, "size": 1}
            ],
            "distributions": [
                {"id": 1, "kind": "NotOverlap", "lessons": [1, 2], "penalty": 0.1},
                {"id": 2, "kind": "NotOverlap", "lessons": [2, 3], "penalty": 0.2},
                {"id": 3, "kind": "NotOverlap", "lessons": [1, 3], "penalty": 0.7}
            ]
        })));
        for order in [[1, 2, 3], [3, 2, 1], [2, 3, 1]] {
            let mut inc = IncrementalEvaluator::new(p.clone());
            for lesson in order {
                inc.place(lesson, place_at(&p, lesson, 1, lesson)).unwrap();
                assert_eq!(inc.total(), evaluate(&p, inc.assignment()).unwrap());
            }
            assert_eq!(
                inc.total().soft_distribution,
                evaluate(&p, inc.assignment()).unwrap().soft_distribution
            );
        }
    }

    #[test]
    fn preview_does_not_commit() {
        let p = Arc::new(scored());
        let inc = IncrementalEvaluator::new(p.clone());
        let delta = inc.preview(1, &place_at(&p, 1, 1, 1)).unwrap();
        assert_eq!(delta.room_preference, 2);
        assert!(inc.assignment().is_empty());
        assert_eq!(inc.total(), PenaltyBreakdown::default());
    }

    #[test]
    fn place_refuses_double_booking_and_keeps_total() {
        let p = Arc::new(scored());
        let mut inc = IncrementalEvaluator::new(p.clone());
        inc.place(1, place_at(&p, 1, 1, 2)).unwrap();
        let before = inc.total();
        let err = inc.place(2, place_at(&p, 2, 1, 2)).unwrap_err();
        assert!(matches!(
            err,
            EvaluationError::Schedule(ScheduleError::OverlapsExisting { .. })
        ));
        assert_eq!(inc.total(), before);
        assert_eq!(
            inc.place(1, place_at(&p, 1, 2, 2)),
            Err(EvaluationError::AlreadyPlaced(1))
        );
    }

    #[test]
    fn reset_clears_everything() {
        let p = Arc::new(fixtures::three_lessons());
        let mut inc = IncrementalEvaluator::new(p.clone());
        inc.place(1, place_at(&p, 1, 1, 1)).unwrap();
        inc.place(2, place_at(&p, 2, 2, 2)).unwrap();
        assert_eq!(inc.total().required_violations, 1);
        inc.reset();
        assert!(inc.assignment().is_empty());
        assert_eq!(inc.total(), PenaltyBreakdown::default());
    }
}
