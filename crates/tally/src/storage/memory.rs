//! In-memory storage strategy.
//!
//! Nothing is persisted; all buckets are lost when the storage is dropped.

use crate::error::{Result, TallyError};
use crate::model::{Event, Timestamp};
use crate::storage::{select_events, validate_bucket_id, BucketMetadata, StorageStrategy};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug)]
struct MemoryBucket {
    metadata: BucketMetadata,
    events: Vec<Event>,
}

/// Storage strategy keeping every bucket in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: RwLock<BTreeMap<String, MemoryBucket>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageStrategy for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_bucket(&self, metadata: BucketMetadata) -> Result<()> {
        validate_bucket_id(&metadata.id)?;
        let mut buckets = self.buckets.write().unwrap_or_else(|err| err.into_inner());
        if buckets.contains_key(&metadata.id) {
            return Err(TallyError::BucketAlreadyExists(metadata.id));
        }
        info!(bucket = %metadata.id, "Created bucket");
        buckets.insert(
            metadata.id.clone(),
            MemoryBucket {
                metadata,
                events: Vec::new(),
            },
        );
        Ok(())
    }

    fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        let mut buckets = self.buckets.write().unwrap_or_else(|err| err.into_inner());
        match buckets.remove(bucket_id) {
            Some(bucket) => {
                info!(bucket = %bucket_id, events = bucket.events.len(), "Deleted bucket");
                Ok(())
            }
            None => Err(TallyError::BucketNotFound(bucket_id.to_string())),
        }
    }

    fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>> {
        let buckets = self.buckets.read().unwrap_or_else(|err| err.into_inner());
        Ok(buckets
            .iter()
            .map(|(id, bucket)| (id.clone(), bucket.metadata.clone()))
            .collect())
    }

    fn get_metadata(&self, bucket_id: &str) -> Result<BucketMetadata> {
        let buckets = self.buckets.read().unwrap_or_else(|err| err.into_inner());
        buckets
            .get(bucket_id)
            .map(|bucket| bucket.metadata.clone())
            .ok_or_else(|| TallyError::BucketNotFound(bucket_id.to_string()))
    }

    fn get(
        &self,
        bucket_id: &str,
        limit: Option<usize>,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<Event>> {
        let buckets = self.buckets.read().unwrap_or_else(|err| err.into_inner());
        let bucket = buckets
            .get(bucket_id)
            .ok_or_else(|| TallyError::BucketNotFound(bucket_id.to_string()))?;
        Ok(select_events(bucket.events.iter().cloned(), limit, start, end))
    }

    fn insert_one(&self, bucket_id: &str, event: Event) -> Result<()> {
        self.insert_many(bucket_id, vec![event])
    }

    fn insert_many(&self, bucket_id: &str, events: Vec<Event>) -> Result<()> {
        let mut buckets = self.buckets.write().unwrap_or_else(|err| err.into_inner());
        let bucket = buckets
            .get_mut(bucket_id)
            .ok_or_else(|| TallyError::BucketNotFound(bucket_id.to_string()))?;
        debug!(bucket = %bucket_id, count = events.len(), "Inserting events");
        bucket.events.extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventData;
    use chrono::{Duration, TimeZone, Utc};

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn make_storage() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage
            .create_bucket(BucketMetadata::new("b", "test", "client", "host", ts(0)))
            .unwrap();
        storage
    }

    #[test]
    fn test_create_duplicate_bucket() {
        let storage = make_storage();
        let err = storage
            .create_bucket(BucketMetadata::new("b", "test", "client", "host", ts(0)))
            .unwrap_err();
        assert!(matches!(err, TallyError::BucketAlreadyExists(id) if id == "b"));
    }

    #[test]
    fn test_delete_bucket() {
        let storage = make_storage();
        storage.delete_bucket("b").unwrap();
        assert!(storage.buckets().unwrap().is_empty());
        assert!(matches!(
            storage.delete_bucket("b"),
            Err(TallyError::BucketNotFound(_))
        ));
    }

    #[test]
    fn test_get_empty_bucket() {
        let storage = make_storage();
        assert!(storage.get("b", None, None, None).unwrap().is_empty());
    }

    #[test]
    fn test_get_missing_bucket() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.get("missing", None, None, None),
            Err(TallyError::BucketNotFound(_))
        ));
        assert!(matches!(
            storage.get_metadata("missing"),
            Err(TallyError::BucketNotFound(_))
        ));
    }

    #[test]
    fn test_insert_and_get_most_recent_first() {
        let storage = make_storage();
        storage
            .insert_one("b", Event::new(ts(0), Duration::seconds(1), EventData::new()))
            .unwrap();
        storage
            .insert_many(
                "b",
                vec![
                    Event::new(ts(20), Duration::seconds(1), EventData::new()),
                    Event::new(ts(10), Duration::seconds(1), EventData::new()),
                ],
            )
            .unwrap();

        let events = storage.get("b", None, None, None).unwrap();
        let starts: Vec<_> = events.iter().map(|e| e.timestamp.timestamp()).collect();
        assert_eq!(starts, vec![20, 10, 0]);

        let limited = storage.get("b", Some(1), None, None).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].timestamp, ts(20));
    }

    #[test]
    fn test_insert_into_missing_bucket() {
        let storage = MemoryStorage::new();
        let event = Event::new(ts(0), Duration::seconds(1), EventData::new());
        assert!(matches!(
            storage.insert_one("missing", event),
            Err(TallyError::BucketNotFound(_))
        ));
    }
}
