//! Storage contract for bucket and event persistence.
//!
//! A [`StorageStrategy`] owns all persisted state: bucket metadata and the
//! append-only event log of every bucket. Three strategies are provided:
//!
//! - [`MemoryStorage`]: process-local maps, mostly for tests
//! - [`FileStorage`]: one directory per bucket with a metadata sidecar and a
//!   checksummed JSON-lines event log
//! - [`RedbStorage`]: an embedded document database file
//!
//! Every strategy serializes its own mutations, so a strategy may be shared
//! between threads. Reads are not isolated from concurrent writes.

pub mod database;
pub mod file;
pub mod memory;

pub use database::RedbStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::{Result, TallyError};
use crate::model::{Event, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata describing a bucket.
///
/// The serialized field set is exactly `{id, name, type, client, hostname,
/// created}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketMetadata {
    /// Unique bucket id.
    pub id: String,
    /// Human readable name, `client-hostname` unless given.
    pub name: String,
    /// Kind of events stored in the bucket.
    #[serde(rename = "type")]
    pub bucket_type: String,
    /// Client that reports into the bucket.
    pub client: String,
    /// Host the client runs on.
    pub hostname: String,
    /// Creation time.
    pub created: Timestamp,
}

impl BucketMetadata {
    /// Creates metadata with the default `client-hostname` name.
    pub fn new(
        id: impl Into<String>,
        bucket_type: impl Into<String>,
        client: impl Into<String>,
        hostname: impl Into<String>,
        created: Timestamp,
    ) -> Self {
        let client = client.into();
        let hostname = hostname.into();
        Self {
            id: id.into(),
            name: format!("{}-{}", client, hostname),
            bucket_type: bucket_type.into(),
            client,
            hostname,
            created,
        }
    }

    /// Overrides the bucket name. Empty names keep the default.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = name;
        }
        self
    }
}

/// Uniform interface implemented by every storage backend.
pub trait StorageStrategy: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Creates a bucket.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::BucketAlreadyExists` if the id is taken and
    /// `TallyError::InvalidBucketId` if it cannot be used as a key.
    fn create_bucket(&self, metadata: BucketMetadata) -> Result<()>;

    /// Deletes a bucket together with all of its events.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::BucketNotFound` if the bucket does not exist.
    fn delete_bucket(&self, bucket_id: &str) -> Result<()>;

    /// Returns the metadata of every bucket keyed by id.
    fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>>;

    /// Returns the metadata of a bucket.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::BucketNotFound` if the bucket does not exist.
    fn get_metadata(&self, bucket_id: &str) -> Result<BucketMetadata>;

    /// Returns events of a bucket, most recent first.
    ///
    /// Only events whose timestamp lies within `[start, end]` are returned;
    /// missing bounds are open. `limit` caps the number of events, `None`
    /// means unbounded. An existing bucket without events yields an empty
    /// list.
    fn get(
        &self,
        bucket_id: &str,
        limit: Option<usize>,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<Event>>;

    /// Appends one event to a bucket.
    fn insert_one(&self, bucket_id: &str, event: Event) -> Result<()>;

    /// Appends events to a bucket, preserving their order.
    fn insert_many(&self, bucket_id: &str, events: Vec<Event>) -> Result<()> {
        for event in events {
            self.insert_one(bucket_id, event)?;
        }
        Ok(())
    }
}

/// Converts a signed limit into an optional bound.
///
/// Zero and negative limits mean "unbounded".
pub fn limit_from_i64(limit: i64) -> Option<usize> {
    if limit <= 0 {
        None
    } else {
        Some(usize::try_from(limit).unwrap_or(usize::MAX))
    }
}

/// Checks that a bucket id can be used as a directory name and as a
/// database key.
pub fn validate_bucket_id(bucket_id: &str) -> Result<()> {
    let invalid = bucket_id.is_empty()
        || bucket_id == "."
        || bucket_id == ".."
        || bucket_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(TallyError::InvalidBucketId(bucket_id.to_string()));
    }
    Ok(())
}

/// Applies the time window and limit of [`StorageStrategy::get`] to a
/// bucket log held in insertion order.
pub(crate) fn select_events<I>(
    log: I,
    limit: Option<usize>,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
) -> Vec<Event>
where
    I: IntoIterator<Item = Event>,
{
    let mut events: Vec<Event> = log
        .into_iter()
        .filter(|e| start.map_or(true, |s| e.timestamp >= s))
        .filter(|e| end.map_or(true, |t| e.timestamp <= t))
        .collect();
    // Stable sort: events with equal keys keep their insertion order.
    events.sort_by(|a, b| b.cmp_period(a));
    if let Some(limit) = limit {
        events.truncate(limit);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventData;
    use chrono::{Duration, TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_metadata_default_name() {
        let meta = BucketMetadata::new("b", "window", "watcher", "host1", ts(0));
        assert_eq!(meta.name, "watcher-host1");
        assert_eq!(meta.with_name("custom").name, "custom");
    }

    #[test]
    fn test_metadata_empty_name_keeps_default() {
        let meta = BucketMetadata::new("b", "window", "watcher", "host1", ts(0)).with_name("");
        assert_eq!(meta.name, "watcher-host1");
    }

    #[test]
    fn test_metadata_wire_fields() {
        let meta = BucketMetadata::new("b", "afk", "watcher", "host1", ts(0));
        let value = serde_json::to_value(&meta).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["client", "created", "hostname", "id", "name", "type"]);

        let parsed: BucketMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_metadata_rejects_unknown_fields() {
        let value = serde_json::json!({
            "id": "b", "name": "n", "type": "t", "client": "c",
            "hostname": "h", "created": "2024-01-01T00:00:00Z", "extra": 1
        });
        assert!(serde_json::from_value::<BucketMetadata>(value).is_err());
    }

    #[test]
    fn test_limit_from_i64() {
        assert_eq!(limit_from_i64(-1), None);
        assert_eq!(limit_from_i64(0), None);
        assert_eq!(limit_from_i64(5), Some(5));
    }

    #[test]
    fn test_validate_bucket_id() {
        assert!(validate_bucket_id("aw-watcher-window_host").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "a\0b"] {
            assert!(matches!(
                validate_bucket_id(bad),
                Err(TallyError::InvalidBucketId(_))
            ));
        }
    }

    #[test]
    fn test_select_events_orders_and_limits() {
        let log: Vec<Event> = (0..5)
            .map(|i| Event::new(ts(i * 10), Duration::seconds(1), EventData::new()))
            .collect();

        let all = select_events(log.clone(), None, None, None);
        let starts: Vec<_> = all.iter().map(|e| e.timestamp.timestamp()).collect();
        assert_eq!(starts, vec![40, 30, 20, 10, 0]);

        let limited = select_events(log.clone(), Some(2), None, None);
        let starts: Vec<_> = limited.iter().map(|e| e.timestamp.timestamp()).collect();
        assert_eq!(starts, vec![40, 30]);

        let window = select_events(log, None, Some(ts(10)), Some(ts(30)));
        let starts: Vec<_> = window.iter().map(|e| e.timestamp.timestamp()).collect();
        assert_eq!(starts, vec![30, 20, 10]);
    }
}
