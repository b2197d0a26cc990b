//! Top-level datastore handle.
//!
//! A [`Datastore`] wraps exactly one [`StorageStrategy`] for its lifetime
//! and hands out [`BucketHandle`]s for per-bucket access.

use crate::config::{DatastoreConfig, StorageMethod};
use crate::error::{Result, TallyError};
use crate::model::{Event, Timestamp};
use crate::storage::{
    limit_from_i64, BucketMetadata, FileStorage, MemoryStorage, RedbStorage, StorageStrategy,
};
use std::collections::BTreeMap;
use tracing::info;

/// Event store organized into buckets.
pub struct Datastore {
    storage: Box<dyn StorageStrategy>,
}

impl Datastore {
    /// Creates a datastore on top of an existing storage strategy.
    pub fn new(storage: impl StorageStrategy + 'static) -> Self {
        Self {
            storage: Box::new(storage),
        }
    }

    /// Creates a datastore backed by [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Opens the storage strategy selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::BackendUnavailable` if the backend cannot be
    /// initialized. The caller decides whether to abort, retry or fall back.
    pub fn open(config: &DatastoreConfig) -> Result<Self> {
        let path = config.storage.resolved_path(config.testing);
        let datastore = match (&config.storage, path) {
            (StorageMethod::Memory, _) => Self::in_memory(),
            (StorageMethod::Files { .. }, Some(path)) => Self::new(FileStorage::open(path)?),
            (StorageMethod::Redb { .. }, Some(path)) => Self::new(RedbStorage::open(path)?),
            (method, None) => {
                return Err(TallyError::BackendUnavailable(format!(
                    "no path for storage method {:?}",
                    method
                )))
            }
        };
        info!(
            storage = datastore.storage.name(),
            testing = config.testing,
            "Opened datastore"
        );
        Ok(datastore)
    }

    /// Returns the underlying storage strategy.
    pub fn storage(&self) -> &dyn StorageStrategy {
        self.storage.as_ref()
    }

    /// Returns the metadata of every bucket keyed by id.
    pub fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>> {
        self.storage.buckets()
    }

    /// Creates a bucket and returns a handle to it.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::BucketAlreadyExists` if the id is taken.
    pub fn create_bucket(&self, metadata: BucketMetadata) -> Result<BucketHandle<'_>> {
        let id = metadata.id.clone();
        self.storage.create_bucket(metadata)?;
        Ok(self.bucket(id))
    }

    /// Deletes a bucket and all of its events.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::BucketNotFound` if the bucket does not exist.
    pub fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        self.storage.delete_bucket(bucket_id)
    }

    /// Returns a handle to a bucket. The bucket is not looked up until the
    /// handle is used.
    pub fn bucket(&self, bucket_id: impl Into<String>) -> BucketHandle<'_> {
        BucketHandle {
            datastore: self,
            id: bucket_id.into(),
        }
    }
}

/// Access to the events and metadata of one bucket.
pub struct BucketHandle<'a> {
    datastore: &'a Datastore,
    id: String,
}

impl<'a> BucketHandle<'a> {
    /// Returns the bucket id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the bucket metadata.
    pub fn metadata(&self) -> Result<BucketMetadata> {
        self.datastore.storage.get_metadata(&self.id)
    }

    /// Returns events most recent first.
    ///
    /// `limit <= 0` means unbounded; `start` and `end` bound the event
    /// timestamps inclusively.
    pub fn get(
        &self,
        limit: i64,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<Event>> {
        self.datastore
            .storage
            .get(&self.id, limit_from_i64(limit), start, end)
    }

    /// Appends one event.
    pub fn insert_one(&self, event: Event) -> Result<()> {
        self.datastore.storage.insert_one(&self.id, event)
    }

    /// Appends events in order.
    pub fn insert_many(&self, events: Vec<Event>) -> Result<()> {
        self.datastore.storage.insert_many(&self.id, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_create_and_use_bucket() {
        let ds = Datastore::in_memory();
        let bucket = ds
            .create_bucket(BucketMetadata::new("window", "currentwindow", "w", "h", ts(0)))
            .unwrap();
        bucket
            .insert_one(Event::with_labels(ts(1), Duration::seconds(1), ["x"]))
            .unwrap();

        assert_eq!(bucket.id(), "window");
        assert_eq!(bucket.metadata().unwrap().name, "w-h");
        assert_eq!(bucket.get(-1, None, None).unwrap().len(), 1);
        assert!(ds.buckets().unwrap().contains_key("window"));
    }

    #[test]
    fn test_open_memory() {
        let ds = Datastore::open(&DatastoreConfig::default()).unwrap();
        assert_eq!(ds.storage().name(), "memory");
    }

    #[test]
    fn test_open_files_testing_namespace() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatastoreConfig::new(StorageMethod::Files {
            path: temp_dir.path().to_path_buf(),
        })
        .with_testing(true);
        let ds = Datastore::open(&config).unwrap();
        ds.create_bucket(BucketMetadata::new("b", "t", "c", "h", ts(0)))
            .unwrap();

        assert_eq!(ds.storage().name(), "files");
        assert!(temp_dir.path().join("testing/buckets/b/metadata.json").is_file());
    }

    #[test]
    fn test_open_redb() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatastoreConfig::new(StorageMethod::Redb {
            path: temp_dir.path().join("tally.redb"),
        });
        let ds = Datastore::open(&config).unwrap();
        assert_eq!(ds.storage().name(), "redb");
        assert!(temp_dir.path().join("tally.redb").is_file());
    }

    #[test]
    fn test_open_unavailable_backend() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let config = DatastoreConfig::new(StorageMethod::Files {
            path: PathBuf::from(&blocker),
        });
        assert!(matches!(
            Datastore::open(&config),
            Err(TallyError::BackendUnavailable(_))
        ));
    }
}
