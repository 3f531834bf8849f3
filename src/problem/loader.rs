//! Problem instance documents and their validation.
//!
//! Instances are JSON documents, one per file. [`load`] reads and parses a
//! file; [`Problem::from_document`] validates a parsed document and builds
//! the immutable [`Problem`].

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ProblemLoadError;
use super::time::{BitPattern, TimeSlot, TimeWindow};
use super::{Distribution, Lesson, Problem, Room, RoomChoice, RoomOption, TimeOption, TravelCost};
use crate::constraints::DistributionKind;
use crate::Id;

/// Top-level instance document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDocument {
    pub name: String,
    pub slots_per_day: u32,
    pub n_days: u32,
    pub n_weeks: u32,
    pub rooms: Vec<RoomDocument>,
    pub time_slots: Vec<TimeSlotDocument>,
    pub lessons: Vec<LessonDocument>,
    #[serde(default)]
    pub distributions: Vec<DistributionDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowDocument {
    pub days: BitPattern,
    pub weeks: BitPattern,
    pub start: u32,
    pub length: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDocument {
    pub id: Id,
    pub capacity: u32,
    #[serde(default)]
    pub unavailable: Vec<WindowDocument>,
    #[serde(default)]
    pub travel: Vec<TravelCost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlotDocument {
    pub id: Id,
    pub days: BitPattern,
    pub weeks: BitPattern,
    pub start: u32,
    pub length: i64,
}

/// Either the keyword `"any"` or an explicit list of room options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomsDocument {
    Keyword(String),
    Options(Vec<RoomOption>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonDocument {
    pub id: Id,
    pub duration: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub group: Id,
    #[serde(default)]
    pub rooms: Option<RoomsDocument>,
    #[serde(default)]
    pub times: Vec<TimeOption>,
    #[serde(default)]
    pub penalty: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionDocument {
    pub id: Id,
    #[serde(flatten)]
    pub kind: DistributionKind,
    pub lessons: Vec<Id>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub penalty: f64,
}

/// Reads, parses and validates the instance at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Problem, ProblemLoadError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ProblemLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: ProblemDocument =
        serde_json::from_str(&raw).map_err(|source| ProblemLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let problem = Problem::from_document(doc)?;
    debug!(
        instance = problem.name(),
        lessons = problem.lessons().len(),
        rooms = problem.rooms().len(),
        time_slots = problem.time_slots().len(),
        distributions = problem.distributions().len(),
        "problem instance loaded"
    );
    Ok(problem)
}

fn check_unique<'a>(
    entity: &'static str,
    ids: impl Iterator<Item = &'a Id>,
) -> Result<HashSet<Id>, ProblemLoadError> {
    let mut seen = HashSet::new();
    for &id in ids {
        if !seen.insert(id) {
            return Err(ProblemLoadError::DuplicateId { entity, id });
        }
    }
    Ok(seen)
}

fn positive_length(length: i64) -> Option<u32> {
    (length > 0).then(|| u32::try_from(length).ok()).flatten()
}

/// The name becomes a directory component for logs and run artifacts.
fn check_name(name: &str) -> Result<(), ProblemLoadError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(ProblemLoadError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Problem {
    /// Validates a parsed document and builds the problem.
    pub fn from_document(doc: ProblemDocument) -> Result<Self, ProblemLoadError> {
        check_name(&doc.name)?;
        if doc.lessons.is_empty() {
            return Err(ProblemLoadError::NoLessons);
        }
        for (field, value) in [
            ("slots_per_day", doc.slots_per_day),
            ("n_days", doc.n_days),
            ("n_weeks", doc.n_weeks),
        ] {
            if value == 0 {
                return Err(ProblemLoadError::EmptyGrid { field });
            }
        }

        let room_ids = check_unique("room", doc.rooms.iter().map(|r| &r.id))?;
        check_unique("time slot", doc.time_slots.iter().map(|s| &s.id))?;
        let lesson_ids = check_unique("lesson", doc.lessons.iter().map(|l| &l.id))?;
        check_unique("distribution", doc.distributions.iter().map(|d| &d.id))?;

        let mut time_slots = Vec::with_capacity(doc.time_slots.len());
        for s in &doc.time_slots {
            let length = positive_length(s.length).ok_or(ProblemLoadError::NonPositiveLength {
                slot: s.id,
                length: s.length,
            })?;
            let end = s
                .start
                .checked_add(length)
                .ok_or(ProblemLoadError::WindowOverflow {
                    entity: "time slot",
                    id: s.id,
                    start: s.start,
                    length,
                })?;
            if end > doc.slots_per_day {
                return Err(ProblemLoadError::SlotOutOfDay {
                    slot: s.id,
                    end,
                    slots_per_day: doc.slots_per_day,
                });
            }
            time_slots.push(TimeSlot {
                id: s.id,
                days: s.days,
                weeks: s.weeks,
                start: s.start,
                length,
            });
        }

        let mut rooms = Vec::with_capacity(doc.rooms.len());
        for r in &doc.rooms {
            let mut unavailable = Vec::with_capacity(r.unavailable.len());
            for w in &r.unavailable {
                let length = positive_length(w.length).ok_or(
                    ProblemLoadError::NonPositiveUnavailableLength {
                        room: r.id,
                        length: w.length,
                    },
                )?;
                if w.start.checked_add(length).is_none() {
                    return Err(ProblemLoadError::WindowOverflow {
                        entity: "room",
                        id: r.id,
                        start: w.start,
                        length,
                    });
                }
                unavailable.push(TimeWindow::new(w.days, w.weeks, w.start, length));
            }
            if let Some(bad) = r.travel.iter().find(|t| !room_ids.contains(&t.room)) {
                return Err(ProblemLoadError::UnknownTravelRoom {
                    room: r.id,
                    other: bad.room,
                });
            }
            rooms.push(Room {
                id: r.id,
                capacity: r.capacity,
                unavailable,
                travel: r.travel.clone(),
            });
        }

        let mut lessons = Vec::with_capacity(doc.lessons.len());
        for l in &doc.lessons {
            if l.duration == 0 {
                return Err(ProblemLoadError::ZeroDuration { lesson: l.id });
            }
            let rooms_choice = match &l.rooms {
                None => RoomChoice::Any,
                Some(RoomsDocument::Keyword(k)) if k.eq_ignore_ascii_case("any") => RoomChoice::Any,
                Some(RoomsDocument::Keyword(k)) => {
                    return Err(ProblemLoadError::InvalidRoomKeyword {
                        lesson: l.id,
                        keyword: k.clone(),
                    })
                }
                Some(RoomsDocument::Options(options)) => {
                    if let Some(bad) = options.iter().find(|o| !room_ids.contains(&o.room)) {
                        return Err(ProblemLoadError::UnknownRoom {
                            lesson: l.id,
                            room: bad.room,
                        });
                    }
                    let mut options = options.clone();
                    options.sort_by_key(|o| o.room);
                    options.dedup_by_key(|o| o.room);
                    RoomChoice::Only(options)
                }
            };

            let mut times = l.times.clone();
            times.sort_by_key(|t| t.slot);
            times.dedup_by_key(|t| t.slot);
            for t in &times {
                let slot = time_slots.iter().find(|s| s.id == t.slot).ok_or(
                    ProblemLoadError::UnknownTimeSlot {
                        lesson: l.id,
                        slot: t.slot,
                    },
                )?;
                if !slot.fits(l.duration) {
                    return Err(ProblemLoadError::LessonDoesNotFit {
                        lesson: l.id,
                        slot: slot.id,
                        duration: l.duration,
                        length: slot.length,
                    });
                }
            }

            lessons.push(Lesson {
                id: l.id,
                duration: l.duration,
                size: l.size,
                group: l.group,
                rooms: rooms_choice,
                times,
                penalty: l.penalty,
            });
        }

        let mut distributions = Vec::with_capacity(doc.distributions.len());
        for d in &doc.distributions {
            if let Some(&bad) = d.lessons.iter().find(|id| !lesson_ids.contains(id)) {
                return Err(ProblemLoadError::UnknownLesson {
                    distribution: d.id,
                    lesson: bad,
                });
            }
            if !d.penalty.is_finite() || d.penalty < 0.0 {
                return Err(ProblemLoadError::InvalidPenalty {
                    distribution: d.id,
                    penalty: d.penalty,
                });
            }
            let mut members: Vec<Id> = Vec::with_capacity(d.lessons.len());
            for &lesson in &d.lessons {
                if !members.contains(&lesson) {
                    members.push(lesson);
                }
            }
            distributions.push(Distribution {
                id: d.id,
                kind: d.kind,
                lessons: members,
                required: d.required,
                penalty: d.penalty,
            });
        }

        Ok(Problem::assemble(
            doc.name,
            (doc.slots_per_day, doc.n_days, doc.n_weeks),
            lessons,
            rooms,
            time_slots,
            distributions,
        ))
    }
}
