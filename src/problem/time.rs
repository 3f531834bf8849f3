//! Time grid primitives: recurring time slots and occupied windows.
//!
//! Time is discrete. A day is split into `slots_per_day` units; `days` and
//! `weeks` are bitsets so one definition can recur over several days and
//! weeks of the semester.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Bitset over days or weeks. Bit `i` set means index `i` is included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BitPattern(pub u64);

impl BitPattern {
    /// Maximum number of positions a pattern can carry.
    pub const CAPACITY: usize = 64;

    /// Parses an ITC-style bit string where the leftmost character is index 0.
    ///
    /// Returns `None` if the string is empty, too long, or contains anything
    /// other than `0` and `1`.
    pub fn parse(bits: &str) -> Option<Self> {
        if bits.is_empty() || bits.len() > Self::CAPACITY {
            return None;
        }
        let mut value = 0u64;
        for (i, c) in bits.chars().enumerate() {
            match c {
                '1' => value |= 1 << i,
                '0' => {}
                _ => return None,
            }
        }
        Some(Self(value))
    }

    /// Renders the pattern as a bit string of `width` characters.
    pub fn to_bit_string(&self, width: usize) -> String {
        (0..width.min(Self::CAPACITY))
            .map(|i| if self.contains(i) { '1' } else { '0' })
            .collect()
    }

    pub fn contains(&self, index: usize) -> bool {
        index < Self::CAPACITY && self.0 & (1 << index) != 0
    }

    pub fn intersects(&self, other: &BitPattern) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is also set in `self`.
    pub fn is_superset_of(&self, other: &BitPattern) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Index of the lowest set bit.
    pub fn first(&self) -> Option<u32> {
        (self.0 != 0).then(|| self.0.trailing_zeros())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl Serialize for BitPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let width = (Self::CAPACITY - self.0.leading_zeros() as usize).max(1);
        serializer.serialize_str(&self.to_bit_string(width))
    }
}

impl<'de> Deserialize<'de> for BitPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BitPattern::parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid bit pattern '{raw}' (expected 1-64 chars of 0/1)"))
        })
    }
}

/// A recurring time slot template: `(days, weeks, start, length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: crate::Id,
    pub days: BitPattern,
    pub weeks: BitPattern,
    /// First slot of the day (slot units).
    pub start: u32,
    /// Length in slot units. Always positive after loading.
    pub length: u32,
}

impl TimeSlot {
    /// Window occupied by a lesson of `duration` slots starting at this slot.
    pub fn window_for(&self, duration: u32) -> TimeWindow {
        TimeWindow::new(self.days, self.weeks, self.start, duration)
    }

    /// Returns true if a lesson of `duration` slots fits inside this slot.
    pub fn fits(&self, duration: u32) -> bool {
        duration <= self.length
    }
}

/// An occupied range on the time grid.
///
/// The daily range is half-open: `[start, end)`. Back-to-back windows do not
/// overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub days: BitPattern,
    pub weeks: BitPattern,
    pub start: u32,
    pub end: u32,
}

impl TimeWindow {
    pub fn new(days: BitPattern, weeks: BitPattern, start: u32, length: u32) -> Self {
        Self {
            days,
            weeks,
            start,
            end: start.saturating_add(length),
        }
    }

    pub fn length(&self) -> u32 {
        self.end - self.start
    }

    /// True if both windows meet on at least one (day, week) pair.
    pub fn shares_days_and_weeks(&self, other: &TimeWindow) -> bool {
        self.days.intersects(&other.days) && self.weeks.intersects(&other.weeks)
    }

    /// True if the daily ranges intersect (ignoring days and weeks).
    pub fn ranges_intersect(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Checks if this window overlaps with another window on the grid.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.shares_days_and_weeks(other) && self.ranges_intersect(other)
    }

    /// Orders two windows by first week, then first day, then start time.
    ///
    /// Returns true if `self` finishes before `other` begins under that
    /// order.
    pub fn precedes(&self, other: &TimeWindow) -> bool {
        let (Some(w1), Some(w2)) = (self.weeks.first(), other.weeks.first()) else {
            return false;
        };
        if w1 != w2 {
            return w1 < w2;
        }
        let (Some(d1), Some(d2)) = (self.days.first(), other.days.first()) else {
            return false;
        };
        if d1 != d2 {
            return d1 < d2;
        }
        self.end <= other.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}) days={:#b} weeks={:#b}",
            self.start, self.end, self.days.0, self.weeks.0
        )
    }
}
