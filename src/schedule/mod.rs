use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::problem::{BitPattern, TimeWindow};
use crate::Id;

pub mod errors;
pub use errors::*;


/// Where a lesson has been placed: a room, the chosen time slot, and the
/// window the lesson actually occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub room: Id,
    pub slot: Id,
    pub window: TimeWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    lesson: Id,
    window: TimeWindow,
}

/// Candidate solution: lessons mapped to placements.
///
/// An `Assignment` keeps every placement indexed by lesson id and by room,
/// so double-booking checks only visit the lessons already in the target
/// room.
///
/// # Internal Structure
/// - `placements`: `BTreeMap` from lesson id to its placement (iteration in id order)
/// - `by_room`: `HashMap` from room id to the lessons occupying it
///
/// # Complexity
/// - `add`: O(log n + k) where k is the number of lessons in the room
/// - `remove`: O(log n + k)
/// - `conflicts`: O(k)
///
/// Partial assignments are valid; `add` refuses placements that would
/// double-book a room, `add_unchecked` accepts them (used to evaluate
/// externally supplied solutions).
///
/// # Examples
///
/// ```
/// use ett_marl::problem::{BitPattern, TimeWindow};
/// use ett_marl::schedule::{Assignment, Placement};
///
/// let monday = BitPattern::parse("1").unwrap();
/// let weeks = BitPattern::parse("1").unwrap();
/// let at = |start| Placement { room: 1, slot: 0, window: TimeWindow::new(monday, weeks, start, 4) };
///
/// let mut assignment = Assignment::new();
/// assignment.add(1, at(0)).unwrap();
/// assignment.add(2, at(4)).unwrap(); // back to back is fine
/// assert!(assignment.add(3, at(2)).is_err());
/// assert_eq!(assignment.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    placements: BTreeMap<Id, Placement>,
    by_room: HashMap<Id, Vec<Entry>>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an assignment without double-booking checks.
    pub fn from_placements(placements: impl IntoIterator<Item = (Id, Placement)>) -> Self {
        let mut assignment = Self::new();
        for (lesson, placement) in placements {
            assignment.add_unchecked(lesson, placement);
        }
        assignment
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Returns true if the lesson is placed.
    pub fn contains_lesson(&self, lesson: Id) -> bool {
        self.placements.contains_key(&lesson)
    }

    pub fn get(&self, lesson: Id) -> Option<&Placement> {
        self.placements.get(&lesson)
    }

    /// Inserts a lesson with its placement.
    ///
    /// Requires:
    /// - `lesson` not already present
    /// - the window does not overlap any lesson already in the same room
    pub fn add(&mut self, lesson: Id, placement: Placement) -> Result<(), ScheduleError> {
        if self.contains_lesson(lesson) {
            return Err(ScheduleError::DuplicateLessonId(lesson));
        }
        if let Some(existing) = self.conflicts(placement.room, &placement.window).next() {
            return Err(ScheduleError::OverlapsExisting {
                new_id: lesson,
                existing_id: existing,
                room: placement.room,
            });
        }
        self.add_unchecked(lesson, placement);
        Ok(())
    }

    /// Inserts a placement even if it double-books the room.
    ///
    /// Replaces any previous placement of the same lesson.
    pub fn add_unchecked(&mut self, lesson: Id, placement: Placement) {
        self.remove(lesson);
        self.by_room.entry(placement.room).or_default().push(Entry {
            lesson,
            window: placement.window,
        });
        self.placements.insert(lesson, placement);
    }

    /// Removes a lesson. Returns its placement if it existed.
    pub fn remove(&mut self, lesson: Id) -> Option<Placement> {
        let placement = self.placements.remove(&lesson)?;
        if let Some(entries) = self.by_room.get_mut(&placement.room) {
            entries.retain(|e| e.lesson != lesson);
        }
        Some(placement)
    }

    /// Iterates over lessons in `room` whose window overlaps `window`.
    pub fn conflicts<'a>(
        &'a self,
        room: Id,
        window: &'a TimeWindow,
    ) -> impl Iterator<Item = Id> + 'a {
        self.by_room
            .get(&room)
            .into_iter()
            .flatten()
            .filter(move |e| e.window.overlaps(window))
            .map(|e| e.lesson)
    }

    /// Checks if `window` is free in `room`.
    pub fn is_free(&self, room: Id, window: &TimeWindow) -> bool {
        self.conflicts(room, window).next().is_none()
    }

    /// Lessons currently placed in `room`, with their windows.
    pub fn room_entries(&self, room: Id) -> impl Iterator<Item = (Id, &TimeWindow)> + '_ {
        self.by_room
            .get(&room)
            .into_iter()
            .flatten()
            .map(|e| (e.lesson, &e.window))
    }

    /// Number of lessons placed in `room`.
    pub fn room_load(&self, room: Id) -> usize {
        self.by_room.get(&room).map_or(0, Vec::len)
    }

    /// Iterates over `(lesson, placement)` in ascending lesson id order.
    pub fn iter(&self) -> impl Iterator<Item = (Id, &Placement)> + '_ {
        self.placements.iter().map(|(&id, p)| (id, p))
    }

    /// Clears all placements while keeping allocated room buckets.
    pub fn clear(&mut self) {
        self.placements.clear();
        for entries in self.by_room.values_mut() {
            entries.clear();
        }
    }

    /// Flat, serializable view of the assignment in lesson id order.
    pub fn records(&self) -> Vec<PlacementRecord> {
        self.iter()
            .map(|(lesson, p)| PlacementRecord {
                lesson,
                room: p.room,
                slot: p.slot,
                days: p.window.days,
                weeks: p.window.weeks,
                start: p.window.start,
                end: p.window.end,
            })
            .collect()
    }
}

/// One row of a written-out solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub lesson: Id,
    pub room: Id,
    pub slot: Id,
    pub days: BitPattern,
    pub weeks: BitPattern,
    pub start: u32,
    pub end: u32,
}
