//! Immutable problem model: lessons, rooms, time slots and distributions.
//!
//! A [`Problem`] is built once per run (see [`loader`]) and then shared
//! read-only, typically behind an `Arc`, by every other component.

pub mod error;
pub mod loader;
pub mod time;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use error::ProblemLoadError;
pub use loader::{load, ProblemDocument};
pub use time::{BitPattern, TimeSlot, TimeWindow};

use crate::constraints::DistributionKind;
use crate::schedule::Placement;
use crate::Id;

/// A permitted room for a lesson, with its preference penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomOption {
    pub room: Id,
    #[serde(default)]
    pub penalty: u32,
}

/// A permitted time slot for a lesson, with its preference penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOption {
    pub slot: Id,
    #[serde(default)]
    pub penalty: u32,
}

/// Rooms a lesson may be placed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomChoice {
    /// Any room of the instance, without preference penalty.
    Any,
    /// Only the listed rooms (sorted by room id).
    Only(Vec<RoomOption>),
}

/// A lesson to be placed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    pub id: Id,
    /// Duration in slot units.
    pub duration: u32,
    /// Number of attendees; must not exceed the room capacity.
    pub size: u32,
    /// Owning resource group (staff member, curriculum).
    pub group: Id,
    pub rooms: RoomChoice,
    /// Permitted time slots sorted by slot id. Empty means every slot that
    /// fits the duration.
    pub times: Vec<TimeOption>,
    /// Penalty charged if the lesson ends the episode unplaced. Falls back to
    /// the run's default when absent.
    pub penalty: Option<f64>,
}

impl Lesson {
    /// Preference penalty of `room`, or `None` if the room is not permitted.
    pub fn room_penalty(&self, room: Id) -> Option<u32> {
        match &self.rooms {
            RoomChoice::Any => Some(0),
            RoomChoice::Only(options) => options
                .binary_search_by_key(&room, |o| o.room)
                .ok()
                .map(|i| options[i].penalty),
        }
    }

    /// Preference penalty of `slot`, or `None` if the slot is not permitted.
    pub fn time_penalty(&self, slot: Id) -> Option<u32> {
        if self.times.is_empty() {
            return Some(0);
        }
        self.times
            .binary_search_by_key(&slot, |o| o.slot)
            .ok()
            .map(|i| self.times[i].penalty)
    }
}

/// Travel time from one room to another, in slot units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelCost {
    pub room: Id,
    pub value: u32,
}

/// A room with its capacity and unavailable windows.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: Id,
    pub capacity: u32,
    pub unavailable: Vec<TimeWindow>,
    pub travel: Vec<TravelCost>,
}

impl Room {
    /// Returns true if no unavailable window of this room overlaps `window`.
    pub fn is_available(&self, window: &TimeWindow) -> bool {
        !self.unavailable.iter().any(|u| u.overlaps(window))
    }
}

/// A constraint binding one rule to a list of lessons.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    pub id: Id,
    pub kind: DistributionKind,
    /// Lessons in document order; `Precedence` depends on it.
    pub lessons: Vec<Id>,
    pub required: bool,
    /// Weight of one violating pair when the distribution is soft.
    pub penalty: f64,
}

/// The immutable timetabling instance being solved.
///
/// All collections are sorted by ascending id. Index lookups are O(1).
#[derive(Debug, Clone)]
pub struct Problem {
    name: String,
    slots_per_day: u32,
    n_days: u32,
    n_weeks: u32,
    lessons: Vec<Lesson>,
    rooms: Vec<Room>,
    time_slots: Vec<TimeSlot>,
    distributions: Vec<Distribution>,
    lesson_index: HashMap<Id, usize>,
    room_index: HashMap<Id, usize>,
    slot_index: HashMap<Id, usize>,
    /// `lesson index → distribution indices` referencing that lesson.
    distributions_by_lesson: Vec<Vec<usize>>,
    /// Symmetric travel matrix keyed by `(min room, max room)`.
    travel: HashMap<(Id, Id), u32>,
}

impl Problem {
    /// Assembles a problem from already-validated parts.
    ///
    /// Callers go through [`Problem::from_document`] or [`load`], which perform
    /// validation first.
    pub(crate) fn assemble(
        name: String,
        grid: (u32, u32, u32),
        mut lessons: Vec<Lesson>,
        mut rooms: Vec<Room>,
        mut time_slots: Vec<TimeSlot>,
        mut distributions: Vec<Distribution>,
    ) -> Self {
        lessons.sort_by_key(|l| l.id);
        rooms.sort_by_key(|r| r.id);
        time_slots.sort_by_key(|s| s.id);
        distributions.sort_by_key(|d| d.id);

        let lesson_index: HashMap<Id, usize> =
            lessons.iter().enumerate().map(|(i, l)| (l.id, i)).collect();
        let room_index = rooms.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
        let slot_index = time_slots.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

        let mut distributions_by_lesson = vec![Vec::new(); lessons.len()];
        for (d_idx, d) in distributions.iter().enumerate() {
            for lesson in &d.lessons {
                if let Some(&l_idx) = lesson_index.get(lesson) {
                    if !distributions_by_lesson[l_idx].contains(&d_idx) {
                        distributions_by_lesson[l_idx].push(d_idx);
                    }
                }
            }
        }

        let mut travel = HashMap::new();
        for room in &rooms {
            for cost in &room.travel {
                let key = (room.id.min(cost.room), room.id.max(cost.room));
                let entry = travel.entry(key).or_insert(0);
                *entry = (*entry).max(cost.value);
            }
        }

        let (slots_per_day, n_days, n_weeks) = grid;
        Self {
            name,
            slots_per_day,
            n_days,
            n_weeks,
            lessons,
            rooms,
            time_slots,
            distributions,
            lesson_index,
            room_index,
            slot_index,
            distributions_by_lesson,
            travel,
        }
    }

    /// Instance name; used to name the per-instance log destination.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slots_per_day(&self) -> u32 {
        self.slots_per_day
    }

    pub fn n_days(&self) -> u32 {
        self.n_days
    }

    pub fn n_weeks(&self) -> u32 {
        self.n_weeks
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn time_slots(&self) -> &[TimeSlot] {
        &self.time_slots
    }

    pub fn distributions(&self) -> &[Distribution] {
        &self.distributions
    }

    pub fn lesson(&self, id: Id) -> Option<&Lesson> {
        self.lesson_index.get(&id).map(|&i| &self.lessons[i])
    }

    pub fn room(&self, id: Id) -> Option<&Room> {
        self.room_index.get(&id).map(|&i| &self.rooms[i])
    }

    pub fn time_slot(&self, id: Id) -> Option<&TimeSlot> {
        self.slot_index.get(&id).map(|&i| &self.time_slots[i])
    }

    /// Position of a lesson in [`Problem::lessons`].
    pub fn lesson_position(&self, id: Id) -> Option<usize> {
        self.lesson_index.get(&id).copied()
    }

    /// Distributions that reference the given lesson, with their position in
    /// [`Problem::distributions`].
    pub fn distributions_of(
        &self,
        lesson: Id,
    ) -> impl Iterator<Item = (usize, &Distribution)> + '_ {
        self.lesson_index
            .get(&lesson)
            .into_iter()
            .flat_map(move |&i| self.distributions_by_lesson[i].iter())
            .map(move |&d| (d, &self.distributions[d]))
    }

    /// Travel time between two rooms (symmetric, zero if unspecified).
    pub fn travel(&self, a: Id, b: Id) -> u32 {
        if a == b {
            return 0;
        }
        self.travel.get(&(a.min(b), a.max(b))).copied().unwrap_or(0)
    }

    /// Largest room capacity, used to normalize observations.
    pub fn max_capacity(&self) -> u32 {
        self.rooms.iter().map(|r| r.capacity).max().unwrap_or(0)
    }

    /// Statically legal placements of a lesson, ascending by slot id then room
    /// id.
    ///
    /// A placement is statically legal when the slot and room are permitted,
    /// the lesson fits the slot, the room is large enough and the room is not
    /// unavailable during the occupied window. Occupancy by other lessons is
    /// not considered here.
    pub fn placement_options(&self, lesson: &Lesson) -> Vec<Placement> {
        let mut options = Vec::new();
        for slot in &self.time_slots {
            if lesson.time_penalty(slot.id).is_none() || !slot.fits(lesson.duration) {
                continue;
            }
            let window = slot.window_for(lesson.duration);
            for room in &self.rooms {
                if lesson.room_penalty(room.id).is_none()
                    || room.capacity < lesson.size
                    || !room.is_available(&window)
                {
                    continue;
                }
                options.push(Placement {
                    room: room.id,
                    slot: slot.id,
                    window,
                });
            }
        }
        options
    }

    /// Lessons grouped by resource group, groups in ascending id order.
    pub fn lessons_by_group(&self) -> Vec<(Id, Vec<Id>)> {
        let mut groups: std::collections::BTreeMap<Id, Vec<Id>> = Default::default();
        for lesson in &self.lessons {
            groups.entry(lesson.group).or_default().push(lesson.id);
        }
        groups.into_iter().collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small instances shared by tests across the crate.

    use super::*;
    use serde_json::json;

    /// Builds a problem from a JSON document, panicking on invalid input.
    pub fn problem(doc: serde_json::Value) -> Problem {
        let doc: ProblemDocument = serde_json::from_value(doc).expect("valid document");
        Problem::from_document(doc).expect("valid problem")
    }

    /// 3 lessons, 2 rooms, 4 time slots, one required "lesson 1 and 2 not
    /// overlapping" distribution.
    pub fn three_lessons() -> Problem {
        problem(json!({
            "name": "three-lessons",
            "slots_per_day": 48, "n_days": 5, "n_weeks": 1,
            "rooms": [
                {"id": 1, "capacity": 30},
                {"id": 2, "capacity": 30}
            ],
            "time_slots": [
                {"id": 1, "days": "10000", "weeks": "1", "start": 16, "length": 4},
                {"id": 2, "days": "10000", "weeks": "1", "start": 18, "length": 4},
                {"id": 3, "days": "01000", "weeks": "1", "start": 16, "length": 4},
                {"id": 4, "days": "00100", "weeks": "1", "start": 16, "length": 4}
            ],
            "lessons": [
                {"id": 1, "duration": 4, "size": 20, "group": 1},
                {"id": 2, "duration": 4, "size": 20, "group": 2},
                {"id": 3, "duration": 4, "size": 20, "group": 1}
            ],
            "distributions": [
                {"id": 1, "kind": "NotOverlap", "lessons": [1, 2], "required": true}
            ]
        }))
    }

    /// Lessons with room and time preferences and no distributions.
    pub fn roomy(n_lessons: u32) -> Problem {
        let lessons: Vec<_> = (1..=n_lessons)
            .map(|id| json!({"id": id, "duration": 2, "size": 10, "group": id % 3}))
            .collect();
        problem(json!({
            "name": "roomy",
            "slots_per_day": 24, "n_days": 5, "n_weeks": 1,
            "rooms": [
                {"id": 1, "capacity": 20},
                {"id": 2, "capacity": 20},
                {"id": 3, "capacity": 40}
            ],
            "time_slots": [
                {"id": 1, "days": "11111", "weeks": "1", "start": 8, "length": 2},
                {"id": 2, "days": "11111", "weeks": "1", "start": 10, "length": 2},
                {"id": 3, "days": "11111", "weeks": "1", "start": 12, "length": 2},
                {"id": 4, "days": "11111", "weeks": "1", "start": 14, "length": 2}
            ],
            "lessons": lessons,
            "distributions": []
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;

    #[test]
    fn collections_are_indexed_by_id() {
        let p = fixtures::three_lessons();
        assert_eq!(p.lessons().len(), 3);
        assert_eq!(p.lesson(2).map(|l| l.group), Some(2));
        assert_eq!(p.room(2).map(|r| r.capacity), Some(30));
        assert_eq!(p.time_slot(4).map(|s| s.start), Some(16));
        assert!(p.lesson(42).is_none());
    }

    #[test]
    fn distributions_of_lesson() {
        let p = fixtures::three_lessons();
        assert_eq!(p.distributions_of(1).count(), 1);
        assert_eq!(p.distributions_of(3).count(), 0);
    }

    #[test]
    fn groups_are_sorted() {
        let p = fixtures::three_lessons();
        let groups = p.lessons_by_group();
        assert_eq!(groups, vec![(1, vec![1, 3]), (2, vec![2])]);
    }

    #[test]
    fn placement_options_are_first_fit_ordered() {
        let p = fixtures::three_lessons();
        let options = p.placement_options(p.lesson(1).unwrap());
        let keys: Vec<_> = options.iter().map(|o| (o.slot, o.room)).collect();
        assert_eq!(
            keys,
            vec![(1, 1), (1, 2), (2, 1), (2, 2), (3, 1), (3, 2), (4, 1), (4, 2)]
        );
    }

    #[test]
    fn placement_options_respect_capacity_and_availability() {
        let p = fixtures::problem(serde_json::json!({
            "name": "gates",
            "slots_per_day": 24, "n_days": 1, "n_weeks": 1,
            "rooms": [
                {"id": 1, "capacity": 5},
                {"id": 2, "capacity": 50,
                 "unavailable": [{"days": "1", "weeks": "1", "start": 0, "length": 4}]}
            ],
            "time_slots": [
                {"id": 1, "days": "1", "weeks": "1", "start": 0, "length": 4},
                {"id": 2, "days": "1", "weeks": "1", "start": 4, "length": 4}
            ],
            "lessons": [{"id": 1, "duration": 4, "size": 10}]
        }));
        let options = p.placement_options(p.lesson(1).unwrap());
        let keys: Vec<_> = options.iter().map(|o| (o.slot, o.room)).collect();
        assert_eq!(keys, vec![(2, 2)]);
    }

    #[test]
    fn lesson_option_lookup() {
        let p = fixtures::three_lessons();
        let lesson = p.lesson(1).unwrap();
        assert_eq!(lesson.room_penalty(2), Some(0));
        assert_eq!(lesson.time_penalty(3), Some(0));
    }
}
