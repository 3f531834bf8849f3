use std::path::PathBuf;

use thiserror::Error;

use crate::Id;

/// Errors raised while loading or validating a problem instance.
///
/// Any of these is fatal for the run: training never starts.
#[derive(Debug, Error)]
pub enum ProblemLoadError {
    #[error("cannot read problem instance {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed problem instance {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("instance name '{0}' must not be empty or contain path separators or '..'")]
    InvalidName(String),

    #[error("problem instance contains no lessons")]
    NoLessons,

    #[error("grid dimension {field} must be positive")]
    EmptyGrid { field: &'static str },

    #[error("duplicate {entity} id {id}")]
    DuplicateId { entity: &'static str, id: Id },

    #[error("lesson {lesson} references unknown room {room}")]
    UnknownRoom { lesson: Id, room: Id },

    #[error("lesson {lesson} references unknown time slot {slot}")]
    UnknownTimeSlot { lesson: Id, slot: Id },

    #[error("distribution {distribution} references unknown lesson {lesson}")]
    UnknownLesson { distribution: Id, lesson: Id },

    #[error("room {room} lists travel to unknown room {other}")]
    UnknownTravelRoom { room: Id, other: Id },

    #[error("time slot {slot} has non-positive length {length}")]
    NonPositiveLength { slot: Id, length: i64 },

    #[error("room {room} has an unavailable window with non-positive length {length}")]
    NonPositiveUnavailableLength { room: Id, length: i64 },

    #[error("time slot {slot} ends at {end}, past the end of the day ({slots_per_day} slots)")]
    SlotOutOfDay {
        slot: Id,
        end: u32,
        slots_per_day: u32,
    },

    #[error("{entity} {id} window starting at {start} with length {length} overflows the grid")]
    WindowOverflow {
        entity: &'static str,
        id: Id,
        start: u32,
        length: u32,
    },

    #[error("lesson {lesson} has zero duration")]
    ZeroDuration { lesson: Id },

    #[error("lesson {lesson} (duration {duration}) does not fit time slot {slot} (length {length})")]
    LessonDoesNotFit {
        lesson: Id,
        slot: Id,
        duration: u32,
        length: u32,
    },

    #[error("lesson {lesson} has invalid rooms keyword '{keyword}' (expected \"any\" or a list)")]
    InvalidRoomKeyword { lesson: Id, keyword: String },

    #[error("distribution {distribution} has an invalid penalty {penalty}")]
    InvalidPenalty { distribution: Id, penalty: f64 },
}
