//! Label set filters.
//!
//! An event matches a label set when any of its labels (see
//! [`Event::labels`]) is a member of the set. For the same label set,
//! [`include_labels`] and [`exclude_labels`] partition their input.

use crate::model::Event;

/// Keeps the events carrying at least one of `labels`.
pub fn include_labels<S: AsRef<str>>(events: Vec<Event>, labels: &[S]) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| event.has_any_label(labels))
        .collect()
}

/// Drops the events carrying any of `labels`.
pub fn exclude_labels<S: AsRef<str>>(events: Vec<Event>, labels: &[S]) -> Vec<Event> {
    events
        .into_iter()
        .filter(|event| !event.has_any_label(labels))
        .collect()
}
