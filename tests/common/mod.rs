#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use ett_marl::algorithms::rl::{StopSignal, TrainerSetup};
use ett_marl::algorithms::Method;
use ett_marl::problem::ProblemDocument;
use ett_marl::progress::{ProgressEvent, ProgressReporter};
use ett_marl::Problem;

pub fn problem(doc: Value) -> Problem {
    let doc: ProblemDocument = serde_json::from_value(doc).expect("valid document");
    Problem::from_document(doc).expect("valid problem")
}

/// 3 lessons, 2 rooms, 4 slots, required NotOverlap(1, 2).
pub fn three_lessons() -> Problem {
    problem(json!({
        "name": "three-lessons",
        "slots_per_day": 48, "n_days": 5, "n_weeks": 1,
        "rooms": [{"id": 1, "capacity": 30}, {"id": 2, "capacity": 30}],
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

/// `n` lessons over 4 rooms and 5 day-long slots, no distributions.
pub fn spacious(n: u32) -> Problem {
    let lessons: Vec<Value> = (1..=n)
        .map(|id| json!({"id": id, "duration": 3, "size": 15, "group": id % 4}))
        .collect();
    problem(json!({
        "name": "spacious",
        "slots_per_day": 24, "n_days": 5, "n_weeks": 2,
        "rooms": [
            {"id": 1, "capacity": 20},
            {"id": 2, "capacity": 20},
            {"id": 3, "capacity": 30},
            {"id": 4, "capacity": 60}
        ],
        "time_slots": [
            {"id": 1, "days": "10000", "weeks": "11", "start": 8, "length": 3},
            {"id": 2, "days": "01000", "weeks": "11", "start": 8, "length": 3},
            {"id": 3, "days": "00100", "weeks": "11", "start": 8, "length": 3},
            {"id": 4, "days": "00010", "weeks": "11", "start": 8, "length": 3},
            {"id": 5, "days": "00001", "weeks": "11", "start": 8, "length": 3}
        ],
        "lessons": lessons,
        "distributions": []
    }))
}

/// A `spacious` variant with soft and required distributions.
pub fn constrained() -> Problem {
    problem(json!({
        "name": "constrained",
        "slots_per_day": 24, "n_days": 5, "n_weeks": 1,
        "rooms": [
            {"id": 1, "capacity": 40, "travel": [{"room": 2, "value": 2}]},
            {"id": 2, "capacity": 40, "travel": [{"room": 1, "value": 2}]}
        ],
        "time_slots": [
            {"id": 1, "days": "10100", "weeks": "1", "start": 8, "length": 2},
            {"id": 2, "days": "10100", "weeks": "1", "start": 10, "length": 2},
            {"id": 3, "days": "01010", "weeks": "1", "start": 8, "length": 2},
            {"id": 4, "days": "01010", "weeks": "1", "start": 10, "length": 2}
        ],
        "lessons": [
            {"id": 1, "duration": 2, "size": 30, "group": 1,
             "rooms": [{"room": 1, "penalty": 0}, {"room": 2, "penalty": 3}],
             "times": [{"slot": 1, "penalty": 0}, {"slot": 3, "penalty": 2}]},
            {"id": 2, "duration": 2, "size": 30, "group": 1},
            {"id": 3, "duration": 2, "size": 10, "group": 2},
            {"id": 4, "duration": 2, "size": 10, "group": 2}
        ],
        "distributions": [
            {"id": 1, "kind": "Precedence", "lessons": [1, 2], "required": true},
            {"id": 2, "kind": "SameAttendees", "lessons": [2, 3, 4], "required": false, "penalty": 5.0},
            {"id": 3, "kind": "DifferentDays", "lessons": [3, 4], "required": false, "penalty": 2.0}
        ]
    }))
}

pub fn setup(method: Method, seed: u64, epochs: u32) -> TrainerSetup {
    let mut setup = TrainerSetup::new(method, seed);
    setup.training.epochs = epochs;
    setup.training.episodes_per_epoch = 2;
    setup
}

/// Records events and raises the stop signal after reporting `stop_after`.
pub struct StopAfter {
    pub stop_after: u32,
    pub stop: StopSignal,
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl StopAfter {
    pub fn new(stop_after: u32, stop: StopSignal) -> Arc<Self> {
        Arc::new(Self {
            stop_after,
            stop,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn epochs(&self) -> Vec<u32> {
        self.events.lock().unwrap().iter().map(|e| e.epoch).collect()
    }
}

impl ProgressReporter for StopAfter {
    fn report(&self, event: ProgressEvent) {
        let epoch = event.epoch;
        self.events.lock().unwrap().push(event);
        if epoch == self.stop_after {
            self.stop.stop();
        }
    }
}
