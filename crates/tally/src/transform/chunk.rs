//! Per-label aggregation of an event list.

use crate::model::{serde_duration_secs, Event};
use chrono::Duration;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Aggregate for a single label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelChunk {
    /// Labels that appeared on the same events as this one.
    pub other_labels: BTreeSet<String>,
    /// Summed duration of the events carrying this label.
    #[serde(serialize_with = "serde_duration_secs::serialize")]
    pub duration: Duration,
}

impl Default for LabelChunk {
    fn default() -> Self {
        Self {
            other_labels: BTreeSet::new(),
            duration: Duration::zero(),
        }
    }
}

/// Summary of an event list grouped by label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkSummary {
    /// Number of events summarized.
    pub eventcount: usize,
    /// Aggregates keyed by label.
    pub chunks: BTreeMap<String, LabelChunk>,
    /// Summed duration of all events.
    #[serde(serialize_with = "serde_duration_secs::serialize")]
    pub duration: Duration,
}

/// Groups `events` by label, recording co-occurring labels and the time
/// spent per label. Events without labels count towards `eventcount` and
/// the total duration only.
pub fn chunk(events: &[Event]) -> ChunkSummary {
    let mut chunks: BTreeMap<String, LabelChunk> = BTreeMap::new();
    let mut total = Duration::zero();

    for event in events {
        let labels = event.labels();
        for label in &labels {
            let entry = chunks.entry((*label).to_string()).or_default();
            entry.duration = saturating_sum(entry.duration, event.duration);
            entry.other_labels.extend(
                labels
                    .iter()
                    .filter(|other| *other != label)
                    .map(|other| (*other).to_string()),
            );
        }
        total = saturating_sum(total, event.duration);
    }

    ChunkSummary {
        eventcount: events.len(),
        chunks,
        duration: total,
    }
}

impl ChunkSummary {
    /// Returns the JSON document for this summary, durations in seconds.
    pub fn to_json(&self) -> Value {
        let chunks: Map<String, Value> = self
            .chunks
            .iter()
            .map(|(label, chunk)| {
                let value = json!({
                    "other_labels": chunk.other_labels,
                    "duration": serde_duration_secs::to_secs(chunk.duration),
                });
                (label.clone(), value)
            })
            .collect();
        json!({
            "eventcount": self.eventcount,
            "chunks": chunks,
            "duration": serde_duration_secs::to_secs(self.duration),
        })
    }
}

fn saturating_sum(a: Duration, b: Duration) -> Duration {
    a.checked_add(&b).unwrap_or(Duration::MAX)
}
