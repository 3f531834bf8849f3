use thiserror::Error;

use crate::Id;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Lesson is already present in the assignment
    #[error("Lesson {0} is already assigned")]
    DuplicateLessonId(Id),

    /// New placement overlaps a lesson already in the same room
    #[error("Lesson {new_id} overlaps lesson {existing_id} in room {room}")]
    OverlapsExisting { new_id: Id, existing_id: Id, room: Id },
}
