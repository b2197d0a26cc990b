//! Property-based tests for the interval algorithms.
//!
//! Uses proptest to check structural guarantees of `period_union`,
//! `filter_period_intersect` and the label filters on arbitrary inputs.
//! Events use whole seconds and positive durations so that every period is
//! non-degenerate.

use alopex_tally::transform::{
    exclude_labels, filter_period_intersect, include_labels, period_union,
};
use alopex_tally::{Event, TimePeriod};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::cmp::Ordering;

const LABELS: [&str; 4] = ["a", "b", "c", "d"];

fn make_event(start: i64, duration: i64, labels: Vec<&str>) -> Event {
    Event::with_labels(
        Utc.timestamp_opt(start, 0).unwrap(),
        Duration::seconds(duration),
        labels,
    )
}

/// Strategy for unsorted events in a small window so that overlaps are common.
fn events_strategy() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec(
        (
            0i64..1_000,
            1i64..100,
            prop::collection::vec(prop::sample::select(LABELS.to_vec()), 0..3),
        ),
        0..40,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .map(|(start, duration, labels)| make_event(start, duration, labels))
            .collect()
    })
}

fn covered_by(period: &TimePeriod, cover: &[Event]) -> bool {
    cover.iter().any(|e| {
        let p = e.period();
        p.start <= period.start && period.end <= p.end
    })
}

proptest! {
    /// Union output is sorted, separated by strict gaps, and covers every input.
    #[test]
    fn test_period_union_is_minimal_cover(a in events_strategy(), b in events_strategy()) {
        let merged = period_union(a.clone(), b.clone());

        for pair in merged.windows(2) {
            prop_assert!(pair[0].end() < pair[1].timestamp);
        }
        for event in a.iter().chain(b.iter()) {
            prop_assert!(covered_by(&event.period(), &merged));
        }

        let input_total: i64 = a.iter().chain(b.iter()).map(|e| e.duration.num_seconds()).sum();
        let merged_total: i64 = merged.iter().map(|e| e.duration.num_seconds()).sum();
        prop_assert!(merged_total <= input_total);
        prop_assert_eq!(merged.is_empty(), a.is_empty() && b.is_empty());
    }

    /// Union is insensitive to which side an event comes from.
    #[test]
    fn test_period_union_symmetric_periods(a in events_strategy(), b in events_strategy()) {
        let ab: Vec<TimePeriod> = period_union(a.clone(), b.clone()).iter().map(Event::period).collect();
        let ba: Vec<TimePeriod> = period_union(b, a).iter().map(Event::period).collect();
        prop_assert_eq!(ab, ba);
    }

    /// Every clipped event lies inside both an original event and a filter period.
    #[test]
    fn test_intersect_stays_within_inputs(events in events_strategy(), filters in events_strategy()) {
        let clipped = filter_period_intersect(events.clone(), filters.clone());

        for event in &clipped {
            let period = event.period();
            prop_assert!(period.duration() > Duration::zero());
            prop_assert!(covered_by(&period, &filters));
            prop_assert!(events.iter().any(|e|
                e.data == event.data && covered_by(&period, std::slice::from_ref(e))
            ));
        }
        for pair in clipped.windows(2) {
            prop_assert_ne!(pair[0].cmp_period(&pair[1]), Ordering::Greater);
        }
    }

    /// A filter spanning everything keeps every event unchanged.
    #[test]
    fn test_intersect_with_full_cover(events in events_strategy()) {
        let cover = vec![make_event(-1, 2_000, vec![])];
        let mut expected = events.clone();
        expected.sort_by(Event::cmp_period);

        prop_assert_eq!(filter_period_intersect(events, cover), expected);
    }

    /// Include and exclude with the same labels partition the input.
    #[test]
    fn test_label_filters_partition(
        events in events_strategy(),
        labels in prop::collection::vec(prop::sample::select(LABELS.to_vec()), 0..4),
    ) {
        let included = include_labels(events.clone(), &labels);
        let excluded = exclude_labels(events.clone(), &labels);

        prop_assert_eq!(included.len() + excluded.len(), events.len());
        prop_assert!(included.iter().all(|e| e.has_any_label(&labels)));
        prop_assert!(excluded.iter().all(|e| !e.has_any_label(&labels)));
    }
}
