//! Time period algebra over event intervals.
//!
//! A [`TimePeriod`] is the closed interval `[start, end]` covered by an
//! event. Intersections are strict: periods that only touch at an endpoint
//! do not intersect, while [`TimePeriod::gap`] treats touching periods as
//! connected so that [`TimePeriod::union`] can join them.

use super::Timestamp;
use chrono::{DateTime, Duration, Utc};

/// The interval `[start, end]` covered by an event.
///
/// Invariant: `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimePeriod {
    /// Start of the period.
    pub start: Timestamp,
    /// End of the period.
    pub end: Timestamp,
}

impl TimePeriod {
    /// Creates a new period.
    ///
    /// If `end` precedes `start` the bounds are swapped so that the
    /// invariant `start <= end` holds.
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    /// Creates a period starting at `start` and lasting `duration`.
    ///
    /// Negative durations yield a zero-length period. Ends past the
    /// representable range saturate at the latest instant.
    pub fn from_duration(start: Timestamp, duration: Duration) -> Self {
        let duration = duration.max(Duration::zero());
        Self {
            start,
            end: saturating_end(start, duration),
        }
    }

    /// Returns the length of the period.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns true if the period has zero length.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns true if `ts` lies within `[start, end]`.
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Returns the overlapping sub-period, or `None` when the periods are
    /// disjoint or only touch at an endpoint.
    pub fn intersection(&self, other: &TimePeriod) -> Option<TimePeriod> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start >= end {
            None
        } else {
            Some(TimePeriod { start, end })
        }
    }

    /// Returns true if the periods share a non-empty sub-period.
    pub fn intersects(&self, other: &TimePeriod) -> bool {
        self.intersection(other).is_some()
    }

    /// Returns the smallest period covering both periods.
    ///
    /// The result only describes covered time when the two periods overlap
    /// or touch; check [`TimePeriod::gap`] first.
    pub fn union(&self, other: &TimePeriod) -> TimePeriod {
        TimePeriod {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Returns true if the periods neither overlap nor touch.
    pub fn gap(&self, other: &TimePeriod) -> bool {
        self.end < other.start || other.end < self.start
    }
}

/// Adds `duration` to `start`, clamping at the latest representable instant.
pub(crate) fn saturating_end(start: Timestamp, duration: Duration) -> Timestamp {
    start
        .checked_add_signed(duration)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
