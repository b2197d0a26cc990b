//! Embedded document database storage strategy backed by redb.
//!
//! Two tables are used:
//!
//! - `bucket_metadata`: bucket id → metadata JSON document
//! - `bucket_events`: `bucket_id \0 sequence(u64, big endian)` → event JSON
//!
//! The sequence number preserves insertion order within a bucket, and the
//! NUL separator keeps the key ranges of different buckets disjoint (bucket
//! ids never contain NUL, see [`validate_bucket_id`]).

use crate::error::{Result, TallyError};
use crate::model::{Event, Timestamp};
use crate::storage::{select_events, validate_bucket_id, BucketMetadata, StorageStrategy};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// Key: bucket id, Value: serialized BucketMetadata
const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("bucket_metadata");

// Key: bucket id, NUL, sequence number; Value: serialized Event
const EVENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("bucket_events");

fn db_err(err: impl Display) -> TallyError {
    TallyError::Database(err.to_string())
}

/// Returns the smallest and the first-past-the-end key of a bucket's events.
fn event_key_range(bucket_id: &str) -> (Vec<u8>, Vec<u8>) {
    let mut lower = bucket_id.as_bytes().to_vec();
    let mut upper = lower.clone();
    lower.push(0);
    upper.push(1);
    (lower, upper)
}

fn event_key(bucket_id: &str, sequence: u64) -> Vec<u8> {
    let mut key = bucket_id.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn key_sequence(key: &[u8]) -> Option<u64> {
    let tail: [u8; 8] = key.get(key.len().checked_sub(8)?..)?.try_into().ok()?;
    Some(u64::from_be_bytes(tail))
}

/// Storage strategy keeping buckets in a single redb database file.
pub struct RedbStorage {
    db: Database,
    path: PathBuf,
}

impl RedbStorage {
    /// Opens or creates the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::BackendUnavailable` if the file cannot be opened
    /// or its tables cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |err: &dyn Display| {
            TallyError::BackendUnavailable(format!("{}: {}", path.display(), err))
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(&e))?;
        }
        let db = Database::create(&path).map_err(|e| unavailable(&e))?;

        let write_txn = db.begin_write().map_err(|e| unavailable(&e))?;
        write_txn.open_table(METADATA).map_err(|e| unavailable(&e))?;
        write_txn.open_table(EVENTS).map_err(|e| unavailable(&e))?;
        write_txn.commit().map_err(|e| unavailable(&e))?;

        info!(path = %path.display(), "Opened redb storage");
        Ok(Self { db, path })
    }

    /// Returns the database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_log(&self, bucket_id: &str) -> Result<Vec<Event>> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(EVENTS).map_err(db_err)?;
        let (lower, upper) = event_key_range(bucket_id);

        let mut events = Vec::new();
        for entry in table
            .range(lower.as_slice()..upper.as_slice())
            .map_err(db_err)?
        {
            let (_, value) = entry.map_err(db_err)?;
            events.push(serde_json::from_slice(value.value())?);
        }
        Ok(events)
    }
}

impl StorageStrategy for RedbStorage {
    fn name(&self) -> &'static str {
        "redb"
    }

    fn create_bucket(&self, metadata: BucketMetadata) -> Result<()> {
        validate_bucket_id(&metadata.id)?;
        let document = serde_json::to_vec(&metadata)?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(METADATA).map_err(db_err)?;
            if table.get(metadata.id.as_str()).map_err(db_err)?.is_some() {
                return Err(TallyError::BucketAlreadyExists(metadata.id));
            }
            table
                .insert(metadata.id.as_str(), document.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;

        info!(bucket = %metadata.id, "Created bucket");
        Ok(())
    }

    fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let removed_events = {
            let mut metadata = write_txn.open_table(METADATA).map_err(db_err)?;
            if metadata.remove(bucket_id).map_err(db_err)?.is_none() {
                return Err(TallyError::BucketNotFound(bucket_id.to_string()));
            }

            let mut events = write_txn.open_table(EVENTS).map_err(db_err)?;
            let (lower, upper) = event_key_range(bucket_id);
            let mut keys = Vec::new();
            for entry in events
                .range(lower.as_slice()..upper.as_slice())
                .map_err(db_err)?
            {
                let (key, _) = entry.map_err(db_err)?;
                keys.push(key.value().to_vec());
            }
            for key in &keys {
                events.remove(key.as_slice()).map_err(db_err)?;
            }
            keys.len()
        };
        write_txn.commit().map_err(db_err)?;

        info!(bucket = %bucket_id, events = removed_events, "Deleted bucket");
        Ok(())
    }

    fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(METADATA).map_err(db_err)?;

        let mut buckets = BTreeMap::new();
        for entry in table.iter().map_err(db_err)? {
            let (key, value) = entry.map_err(db_err)?;
            let metadata: BucketMetadata = serde_json::from_slice(value.value())?;
            buckets.insert(key.value().to_string(), metadata);
        }
        Ok(buckets)
    }

    fn get_metadata(&self, bucket_id: &str) -> Result<BucketMetadata> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(METADATA).map_err(db_err)?;
        let document = table
            .get(bucket_id)
            .map_err(db_err)?
            .ok_or_else(|| TallyError::BucketNotFound(bucket_id.to_string()))?;
        serde_json::from_slice(document.value()).map_err(|err| TallyError::CorruptRecord {
            path: self.path.clone(),
            reason: format!("metadata of bucket {}: {}", bucket_id, err),
        })
    }

    fn get(
        &self,
        bucket_id: &str,
        limit: Option<usize>,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<Event>> {
        self.get_metadata(bucket_id)?;
        let log = self.read_log(bucket_id)?;
        Ok(select_events(log, limit, start, end))
    }

    fn insert_one(&self, bucket_id: &str, event: Event) -> Result<()> {
        self.insert_many(bucket_id, vec![event])
    }

    fn insert_many(&self, bucket_id: &str, events: Vec<Event>) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let metadata = write_txn.open_table(METADATA).map_err(db_err)?;
            if metadata.get(bucket_id).map_err(db_err)?.is_none() {
                return Err(TallyError::BucketNotFound(bucket_id.to_string()));
            }
        }
        {
            let mut table = write_txn.open_table(EVENTS).map_err(db_err)?;
            let (lower, upper) = event_key_range(bucket_id);
            let last = match table
                .range(lower.as_slice()..upper.as_slice())
                .map_err(db_err)?
                .next_back()
            {
                Some(entry) => {
                    let (key, _) = entry.map_err(db_err)?;
                    key_sequence(key.value())
                }
                None => None,
            };
            let mut next_sequence = last.map_or(0, |seq| seq + 1);

            for event in &events {
                let document = serde_json::to_vec(event)?;
                let key = event_key(bucket_id, next_sequence);
                table
                    .insert(key.as_slice(), document.as_slice())
                    .map_err(db_err)?;
                next_sequence += 1;
            }
        }
        write_txn.commit().map_err(db_err)?;

        debug!(bucket = %bucket_id, count = events.len(), "Inserted events");
        Ok(())
    }
}
