//! Core data model: events and the periods they cover.

pub mod period;

pub use period::TimePeriod;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

/// Instant type used for event timestamps.
pub type Timestamp = DateTime<Utc>;

/// Arbitrary event payload.
pub type EventData = Map<String, Value>;

/// A timestamped, duration-bounded activity record.
///
/// Events are ordered by `(timestamp, duration)`; use [`sort_events`] or
/// [`Event::cmp_period`] to sort them. Operations that reshape an event
/// (clipping, merging) produce a new event instead of mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Start of the event.
    #[serde(with = "serde_timestamp")]
    pub timestamp: Timestamp,
    /// Length of the event, never negative.
    #[serde(with = "serde_duration_secs")]
    pub duration: Duration,
    /// Payload, including labels.
    #[serde(default)]
    pub data: EventData,
}

impl Event {
    /// Creates a new event. Negative durations are clamped to zero.
    pub fn new(timestamp: Timestamp, duration: Duration, data: EventData) -> Self {
        Self {
            timestamp,
            duration: duration.max(Duration::zero()),
            data,
        }
    }

    /// Creates a new event with a `label` entry in its payload.
    pub fn with_labels<I, S>(timestamp: Timestamp, duration: Duration, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<Value> = labels.into_iter().map(|l| Value::String(l.into())).collect();
        let mut data = EventData::new();
        data.insert("label".to_string(), Value::Array(labels));
        Self::new(timestamp, duration, data)
    }

    /// Returns the end of the event.
    pub fn end(&self) -> Timestamp {
        period::saturating_end(self.timestamp, self.duration)
    }

    /// Returns the period covered by this event.
    pub fn period(&self) -> TimePeriod {
        TimePeriod::from_duration(self.timestamp, self.duration)
    }

    /// Returns a copy of this event moved to `period`, keeping its payload.
    pub fn with_period(&self, period: TimePeriod) -> Event {
        Event {
            timestamp: period.start,
            duration: period.duration(),
            data: self.data.clone(),
        }
    }

    /// Compares two events by `(timestamp, duration)`.
    pub fn cmp_period(&self, other: &Event) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.duration.cmp(&other.duration))
    }

    /// Returns the labels attached to this event.
    ///
    /// Labels are read from `data["label"]` and `data["labels"]`, each of
    /// which may be a single string or an array of strings. Non-string
    /// entries are ignored.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels = Vec::new();
        for key in ["label", "labels"] {
            match self.data.get(key) {
                Some(Value::String(label)) => labels.push(label.as_str()),
                Some(Value::Array(values)) => {
                    labels.extend(values.iter().filter_map(Value::as_str));
                }
                _ => {}
            }
        }
        labels
    }

    /// Returns true if any of this event's labels is in `labels`.
    pub fn has_any_label<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        self.labels()
            .iter()
            .any(|own| labels.iter().any(|l| l.as_ref() == *own))
    }

    /// Returns the canonical external JSON form of this event:
    /// `{timestamp, duration, data}` with an RFC 3339 timestamp and the
    /// duration in seconds.
    pub fn to_json(&self) -> Value {
        json!({
            "timestamp": serde_timestamp::format(&self.timestamp),
            "duration": serde_duration_secs::to_secs(self.duration),
            "data": self.data,
        })
    }

    /// Parses an event from its external JSON form.
    pub fn from_json(value: Value) -> crate::Result<Event> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Sorts events in place by `(timestamp, duration)`. The sort is stable.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(Event::cmp_period);
}

mod serde_timestamp {
    use super::Timestamp;
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &Timestamp) -> String {
        ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

pub(crate) mod serde_duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn to_secs(duration: Duration) -> f64 {
        match duration.num_nanoseconds() {
            Some(nanos) => nanos as f64 / 1e9,
            None => duration.num_milliseconds() as f64 / 1e3,
        }
    }

    pub fn from_secs(secs: f64) -> Option<Duration> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        let nanos = (secs * 1e9).round();
        if nanos <= i64::MAX as f64 {
            Some(Duration::nanoseconds(nanos as i64))
        } else {
            Some(Duration::milliseconds((secs * 1e3).round() as i64))
        }
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(to_secs(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        from_secs(secs).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid duration: {secs} seconds"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_new_clamps_negative_duration() {
        let event = Event::new(ts(0), Duration::seconds(-5), EventData::new());
        assert_eq!(event.duration, Duration::zero());
        assert!(event.period().is_empty());
    }

    #[test]
    fn test_with_period_keeps_data() {
        let event = Event::with_labels(ts(0), Duration::seconds(10), ["x"]);
        let clipped = event.with_period(TimePeriod::new(ts(2), ts(5)));
        assert_eq!(clipped.timestamp, ts(2));
        assert_eq!(clipped.duration, Duration::seconds(3));
        assert_eq!(clipped.data, event.data);
    }

    #[test]
    fn test_sort_by_timestamp_then_duration() {
        let mut events = vec![
            Event::new(ts(5), Duration::seconds(1), EventData::new()),
            Event::new(ts(0), Duration::seconds(9), EventData::new()),
            Event::new(ts(0), Duration::seconds(2), EventData::new()),
        ];
        sort_events(&mut events);
        let keys: Vec<_> = events.iter().map(|e| (e.timestamp, e.duration)).collect();
        assert_eq!(
            keys,
            vec![
                (ts(0), Duration::seconds(2)),
                (ts(0), Duration::seconds(9)),
                (ts(5), Duration::seconds(1)),
            ]
        );
    }

    #[test]
    fn test_labels_from_label_and_labels() {
        let mut data = EventData::new();
        data.insert("label".into(), json!(["a", "b", 3]));
        data.insert("labels".into(), json!("c"));
        let event = Event::new(ts(0), Duration::zero(), data);
        assert_eq!(event.labels(), vec!["a", "b", "c"]);
        assert!(event.has_any_label(&["c"]));
        assert!(!event.has_any_label(&["d"]));
    }

    #[test]
    fn test_labels_missing() {
        let event = Event::new(ts(0), Duration::zero(), EventData::new());
        assert!(event.labels().is_empty());
        assert!(!event.has_any_label(&["a"]));
    }

    #[test]
    fn test_json_form() {
        let event = Event::with_labels(ts(0), Duration::milliseconds(1500), ["x"]);
        let value = event.to_json();
        assert_eq!(value["timestamp"], json!("1970-01-01T00:00:00Z"));
        assert_eq!(value["duration"], json!(1.5));
        assert_eq!(value["data"]["label"], json!(["x"]));

        let parsed = Event::from_json(value).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_serde_matches_json_form() {
        let event = Event::with_labels(ts(1_700_000_000), Duration::seconds(42), ["y"]);
        assert_eq!(serde_json::to_value(&event).unwrap(), event.to_json());
    }

    #[test]
    fn test_huge_duration_does_not_overflow() {
        let value = json!({"timestamp": "2024-01-01T00:00:00Z", "duration": 1e13, "data": {}});
        let event = Event::from_json(value).unwrap();
        assert_eq!(event.end(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(event.period().end, event.end());

        let filter = Event::new(event.timestamp, Duration::seconds(10), EventData::new());
        let clipped = crate::transform::filter_period_intersect(vec![event.clone()], vec![filter]);
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].duration, Duration::seconds(10));

        let summary = crate::transform::chunk(&[event.clone(), event]);
        assert_eq!(summary.eventcount, 2);
    }

    #[test]
    fn test_from_json_rejects_negative_duration() {
        let value = json!({"timestamp": "2024-01-01T00:00:00Z", "duration": -1.0, "data": {}});
        assert!(Event::from_json(value).is_err());
    }

    #[test]
    fn test_from_json_accepts_offset_and_missing_data() {
        let value = json!({"timestamp": "2024-01-01T02:00:00+02:00", "duration": 0});
        let event = Event::from_json(value).unwrap();
        assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(event.data.is_empty());
    }
}
