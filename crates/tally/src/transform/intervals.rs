//! Interval merge algorithms over sorted event streams.
//!
//! ```text
//! filter_period_intersect
//!   events        |   =======        ======== |
//!   filterevents  | ------  ---  ---   ----   |
//!   result        |   ====  =          ====   |
//!
//! period_union
//!   events1       |   =======       ========= |
//!   events2       | ------  ---  --    ----   |
//!   result        | -----------  -- ========= |
//! ```

use crate::model::{sort_events, Event, TimePeriod};
use tracing::error;

/// Yields every intersecting pair of two sorted event lists together with
/// the intersected period.
///
/// Both inputs must be sorted by `(timestamp, duration)`.
struct IntersectingPairs<'a> {
    events: &'a [Event],
    filters: &'a [Event],
    event_idx: usize,
    filter_idx: usize,
}

impl<'a> IntersectingPairs<'a> {
    fn new(events: &'a [Event], filters: &'a [Event]) -> Self {
        Self {
            events,
            filters,
            event_idx: 0,
            filter_idx: 0,
        }
    }
}

impl<'a> Iterator for IntersectingPairs<'a> {
    type Item = (&'a Event, TimePeriod);

    fn next(&mut self) -> Option<Self::Item> {
        while self.event_idx < self.events.len() && self.filter_idx < self.filters.len() {
            let event = &self.events[self.event_idx];
            let event_p = event.period();
            let filter_p = self.filters[self.filter_idx].period();

            if let Some(ip) = event_p.intersection(&filter_p) {
                if event_p.end <= filter_p.end {
                    self.event_idx += 1;
                } else {
                    self.filter_idx += 1;
                }
                return Some((event, ip));
            }

            if event_p.end <= filter_p.start {
                // Event ended before the filter period started.
                self.event_idx += 1;
            } else if filter_p.end <= event_p.start {
                // Filter period ended before the event started.
                self.filter_idx += 1;
            } else {
                error!(
                    event_start = %event_p.start,
                    filter_start = %filter_p.start,
                    "Should be unreachable, skipping period"
                );
                self.event_idx += 1;
                self.filter_idx += 1;
            }
        }
        None
    }
}

/// Clips `events` to the periods covered by `filterevents`.
///
/// Every overlap between an event and a filter period produces one event
/// carrying the original payload, moved to the overlapping period. An event
/// spanning several filter periods therefore yields several clipped copies.
/// The result is sorted by `(timestamp, duration)`.
///
/// Typical use is removing the time a user was away:
///
/// ```rust,ignore
/// let active_windows = filter_period_intersect(window_events, not_afk_events);
/// ```
pub fn filter_period_intersect(mut events: Vec<Event>, mut filterevents: Vec<Event>) -> Vec<Event> {
    sort_events(&mut events);
    sort_events(&mut filterevents);

    let mut clipped: Vec<Event> = IntersectingPairs::new(&events, &filterevents)
        .map(|(event, ip)| event.with_period(ip))
        .collect();
    // Clipping can shorten an earlier event below a later one sharing its start.
    sort_events(&mut clipped);
    clipped
}

/// Merges two event lists into a minimal set of non-overlapping events
/// covering the same time.
///
/// Touching or overlapping periods are joined; periods separated by a gap
/// stay apart. The payload of a merged event is that of the first event of
/// its run, and callers should not rely on it.
pub fn period_union(events1: Vec<Event>, events2: Vec<Event>) -> Vec<Event> {
    let events = union(events1, events2);
    let mut merged: Vec<Event> = Vec::with_capacity(events.len());

    for event in events {
        match merged.last_mut() {
            Some(last) => {
                let last_p = last.period();
                let event_p = event.period();
                if event_p.gap(&last_p) {
                    merged.push(event);
                } else {
                    *last = last.with_period(event_p.union(&last_p));
                }
            }
            None => merged.push(event),
        }
    }
    merged
}

/// Concatenates two event lists and sorts the result without merging
/// overlapping periods.
pub fn union(mut events1: Vec<Event>, events2: Vec<Event>) -> Vec<Event> {
    events1.extend(events2);
    sort_events(&mut events1);
    events1
}
