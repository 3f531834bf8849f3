//! Built-in distribution constraint kinds.
//!
//! A distribution binds one rule to a list of lessons. Every kind is
//! evaluated pairwise: for lessons `a` and `b` (with `a` earlier in the
//! distribution's lesson list) the rule either holds or the pair counts as
//! one violation.
//!
//! | Kind             | Pair satisfied when                                        |
//! |------------------|------------------------------------------------------------|
//! | `SameStart`      | both start at the same slot of the day                     |
//! | `SameTime`       | one daily range contains the other                         |
//! | `DifferentTime`  | daily ranges do not intersect                              |
//! | `SameDays`       | one day set contains the other                             |
//! | `DifferentDays`  | day sets are disjoint                                      |
//! | `SameWeeks`      | one week set contains the other                            |
//! | `DifferentWeeks` | week sets are disjoint                                     |
//! | `Overlap`        | windows overlap on the grid                                |
//! | `NotOverlap`     | windows do not overlap on the grid                         |
//! | `SameRoom`       | both use the same room                                     |
//! | `DifferentRoom`  | rooms differ                                               |
//! | `SameAttendees`  | no overlap even after adding the travel time between rooms |
//! | `Precedence`     | `a` ends before `b` starts (week, then day, then time)     |
//! | `MinGap`         | at least `gap` slots between them on shared days           |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schedule::Placement;

/// Enumeration of built-in distribution kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DistributionKind {
    SameStart,
    SameTime,
    DifferentTime,
    SameDays,
    DifferentDays,
    SameWeeks,
    DifferentWeeks,
    Overlap,
    NotOverlap,
    SameRoom,
    DifferentRoom,
    SameAttendees,
    Precedence,
    MinGap { gap: u32 },
}

impl DistributionKind {
    /// Returns true if the pair `(a, b)` satisfies this rule.
    ///
    /// `travel` is the travel time between the two rooms in slot units; only
    /// `SameAttendees` looks at it.
    pub fn pair_satisfied(&self, a: &Placement, b: &Placement, travel: u32) -> bool {
        let (wa, wb) = (&a.window, &b.window);
        match self {
            Self::SameStart => wa.start == wb.start,
            Self::SameTime => {
                (wa.start <= wb.start && wb.end <= wa.end)
                    || (wb.start <= wa.start && wa.end <= wb.end)
            }
            Self::DifferentTime => !wa.ranges_intersect(wb),
            Self::SameDays => wa.days.is_superset_of(&wb.days) || wb.days.is_superset_of(&wa.days),
            Self::DifferentDays => !wa.days.intersects(&wb.days),
            Self::SameWeeks => {
                wa.weeks.is_superset_of(&wb.weeks) || wb.weeks.is_superset_of(&wa.weeks)
            }
            Self::DifferentWeeks => !wa.weeks.intersects(&wb.weeks),
            Self::Overlap => wa.overlaps(wb),
            Self::NotOverlap => !wa.overlaps(wb),
            Self::SameRoom => a.room == b.room,
            Self::DifferentRoom => a.room != b.room,
            Self::SameAttendees => {
                !wa.shares_days_and_weeks(wb)
                    || wa.end.saturating_add(travel) <= wb.start
                    || wb.end.saturating_add(travel) <= wa.start
            }
            Self::Precedence => wa.precedes(wb),
            Self::MinGap { gap } => {
                !wa.shares_days_and_weeks(wb)
                    || wa.end.saturating_add(*gap) <= wb.start
                    || wb.end.saturating_add(*gap) <= wa.start
            }
        }
    }

    /// True if the rule only constrains time, so room choice never matters.
    pub fn is_time_only(&self) -> bool {
        !matches!(
            self,
            Self::SameRoom | Self::DifferentRoom | Self::SameAttendees
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SameStart => "SameStart",
            Self::SameTime => "SameTime",
            Self::DifferentTime => "DifferentTime",
            Self::SameDays => "SameDays",
            Self::DifferentDays => "DifferentDays",
            Self::SameWeeks => "SameWeeks",
            Self::DifferentWeeks => "DifferentWeeks",
            Self::Overlap => "Overlap",
            Self::NotOverlap => "NotOverlap",
            Self::SameRoom => "SameRoom",
            Self::DifferentRoom => "DifferentRoom",
            Self::SameAttendees => "SameAttendees",
            Self::Precedence => "Precedence",
            Self::MinGap { .. } => "MinGap",
        }
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinGap { gap } => write!(f, "MinGap({gap})"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::time::{BitPattern, TimeWindow};

    fn placed(room: u32, days: &str, start: u32, length: u32) -> Placement {
        Placement {
            room,
            slot: 0,
            window: TimeWindow::new(
                BitPattern::parse(days).unwrap(),
                BitPattern::parse("1").unwrap(),
                start,
                length,
            ),
        }
    }

    #[test]
    fn not_overlap_and_overlap_are_complements() {
        let a = placed(1, "1", 0, 10);
        let b = placed(2, "1", 5, 10);
        let c = placed(2, "1", 10, 10);
        assert!(!DistributionKind::NotOverlap.pair_satisfied(&a, &b, 0));
        assert!(DistributionKind::Overlap.pair_satisfied(&a, &b, 0));
        assert!(DistributionKind::NotOverlap.pair_satisfied(&a, &c, 0));
        assert!(!DistributionKind::Overlap.pair_satisfied(&a, &c, 0));
    }

    #[test]
    fn same_attendees_accounts_for_travel() {
        let a = placed(1, "1", 0, 10);
        let b = placed(2, "1", 12, 10);
        assert!(DistributionKind::SameAttendees.pair_satisfied(&a, &b, 2));
        assert!(!DistributionKind::SameAttendees.pair_satisfied(&a, &b, 3));
        // different days never clash
        let other_day = placed(2, "01", 10, 10);
        assert!(DistributionKind::SameAttendees.pair_satisfied(&a, &other_day, 50));
    }

    #[test]
    fn min_gap_requires_distance() {
        let a = placed(1, "1", 0, 10);
        let b = placed(1, "1", 14, 4);
        assert!(DistributionKind::MinGap { gap: 4 }.pair_satisfied(&a, &b, 0));
        assert!(!DistributionKind::MinGap { gap: 5 }.pair_satisfied(&a, &b, 0));
    }

    #[test]
    fn huge_travel_and_gap_saturate() {
        let a = placed(1, "1", 0, 10);
        let b = placed(2, "1", 20, 10);
        assert!(!DistributionKind::SameAttendees.pair_satisfied(&a, &b, u32::MAX));
        assert!(!DistributionKind::MinGap { gap: u32::MAX }.pair_satisfied(&b, &a, 0));
        assert!(DistributionKind::MinGap { gap: 10 }.pair_satisfied(&a, &b, 0));
    }

    #[test]
    fn day_set_rules() {
        let mon_wed = placed(1, "101", 0, 5);
        let mon = placed(1, "1", 20, 5);
        let tue = placed(1, "01", 20, 5);
        assert!(DistributionKind::SameDays.pair_satisfied(&mon_wed, &mon, 0));
        assert!(!DistributionKind::SameDays.pair_satisfied(&mon, &tue, 0));
        assert!(DistributionKind::DifferentDays.pair_satisfied(&mon, &tue, 0));
    }

    #[test]
    fn precedence_is_ordered() {
        let first = placed(1, "1", 0, 5);
        let second = placed(1, "1", 5, 5);
        assert!(DistributionKind::Precedence.pair_satisfied(&first, &second, 0));
        assert!(!DistributionKind::Precedence.pair_satisfied(&second, &first, 0));
    }

    #[test]
    fn kind_deserializes_from_tagged_json() {
        let k: DistributionKind = serde_json::from_str(r#"{"kind":"MinGap","gap":6}"#).unwrap();
        assert_eq!(k, DistributionKind::MinGap { gap: 6 });
        let k: DistributionKind = serde_json::from_str(r#"{"kind":"SameRoom"}"#).unwrap();
        assert_eq!(k.to_string(), "SameRoom");
    }
}
