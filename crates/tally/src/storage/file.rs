//! File-backed storage strategy.
//!
//! # Layout
//!
//! ```text
//! <root>/buckets/<bucket_id>/metadata.json
//! <root>/buckets/<bucket_id>/events.log
//! ```
//!
//! `metadata.json` holds the bucket metadata and is replaced atomically.
//! `events.log` is append-only, one event per line:
//!
//! ```text
//! <crc32 as 8 hex digits> <event JSON>\n
//! ```
//!
//! The checksum covers the JSON text. Lines that fail the checksum or do
//! not parse (for example a line torn by a crash mid-append) are skipped
//! on read. A torn final line is cut off before the next append so that
//! new records always start on a fresh line.

use crate::error::{Result, TallyError};
use crate::model::{Event, Timestamp};
use crate::storage::{select_events, validate_bucket_id, BucketMetadata, StorageStrategy};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Metadata sidecar file name.
const METADATA_FILE: &str = "metadata.json";

/// Event log file name.
const EVENTS_FILE: &str = "events.log";

/// Directory holding the bucket directories.
const BUCKETS_DIR: &str = "buckets";

/// Storage strategy keeping each bucket in its own directory.
#[derive(Debug)]
pub struct FileStorage {
    buckets_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens file storage rooted at `root`, creating directories as needed.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::BackendUnavailable` if the bucket directory
    /// cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let buckets_dir = root.as_ref().join(BUCKETS_DIR);
        fs::create_dir_all(&buckets_dir).map_err(|err| {
            TallyError::BackendUnavailable(format!(
                "cannot create bucket directory {}: {}",
                buckets_dir.display(),
                err
            ))
        })?;
        debug!(path = %buckets_dir.display(), "Opened file storage");
        Ok(Self {
            buckets_dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the directory holding the bucket directories.
    pub fn buckets_dir(&self) -> &Path {
        &self.buckets_dir
    }

    fn bucket_dir(&self, bucket_id: &str) -> PathBuf {
        self.buckets_dir.join(bucket_id)
    }

    fn metadata_path(&self, bucket_id: &str) -> PathBuf {
        self.bucket_dir(bucket_id).join(METADATA_FILE)
    }

    fn events_path(&self, bucket_id: &str) -> PathBuf {
        self.bucket_dir(bucket_id).join(EVENTS_FILE)
    }

    fn ensure_exists(&self, bucket_id: &str) -> Result<()> {
        validate_bucket_id(bucket_id)
            .map_err(|_| TallyError::BucketNotFound(bucket_id.to_string()))?;
        if self.metadata_path(bucket_id).is_file() {
            Ok(())
        } else {
            Err(TallyError::BucketNotFound(bucket_id.to_string()))
        }
    }

    fn read_log(&self, bucket_id: &str) -> Result<Vec<Event>> {
        let path = self.events_path(bucket_id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut events = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match decode_line(&line) {
                Some(event) => events.push(event),
                None => warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    "Skipping corrupt event record"
                ),
            }
        }
        Ok(events)
    }
}

/// Truncates a trailing partial line left behind by an interrupted append.
///
/// Returns the number of bytes removed.
fn truncate_torn_tail(file: &mut File) -> Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(0);
    }

    let mut contents = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut contents)?;
    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos as u64 + 1);
    file.set_len(keep)?;
    Ok(len - keep)
}

/// Encodes an event as a checksummed log line, including the newline.
fn encode_line(event: &Event) -> Result<String> {
    let json = serde_json::to_string(event)?;
    let crc = crc32fast::hash(json.as_bytes());
    Ok(format!("{:08x} {}\n", crc, json))
}

/// Decodes a log line, returning `None` if it is torn or corrupt.
fn decode_line(line: &str) -> Option<Event> {
    let (crc_hex, json) = line.split_once(' ')?;
    let expected = u32::from_str_radix(crc_hex, 16).ok()?;
    if crc32fast::hash(json.as_bytes()) != expected {
        return None;
    }
    serde_json::from_str(json).ok()
}

impl StorageStrategy for FileStorage {
    fn name(&self) -> &'static str {
        "files"
    }

    fn create_bucket(&self, metadata: BucketMetadata) -> Result<()> {
        validate_bucket_id(&metadata.id)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|err| err.into_inner());

        let metadata_path = self.metadata_path(&metadata.id);
        if metadata_path.exists() {
            return Err(TallyError::BucketAlreadyExists(metadata.id));
        }

        let bucket_dir = self.bucket_dir(&metadata.id);
        fs::create_dir_all(&bucket_dir)?;

        // Write to a temporary file, then rename for atomicity.
        let temp_path = bucket_dir.join(format!("{}.tmp", METADATA_FILE));
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&serde_json::to_vec(&metadata)?)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &metadata_path)?;

        info!(bucket = %metadata.id, path = %bucket_dir.display(), "Created bucket");
        Ok(())
    }

    fn delete_bucket(&self, bucket_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|err| err.into_inner());
        self.ensure_exists(bucket_id)?;
        fs::remove_dir_all(self.bucket_dir(bucket_id))?;
        info!(bucket = %bucket_id, "Deleted bucket");
        Ok(())
    }

    fn buckets(&self) -> Result<BTreeMap<String, BucketMetadata>> {
        let mut buckets = BTreeMap::new();
        for entry in fs::read_dir(&self.buckets_dir)? {
            let entry = entry?;
            if !entry.path().join(METADATA_FILE).is_file() {
                continue;
            }
            let Some(bucket_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let metadata = self.get_metadata(&bucket_id)?;
            buckets.insert(bucket_id, metadata);
        }
        Ok(buckets)
    }

    fn get_metadata(&self, bucket_id: &str) -> Result<BucketMetadata> {
        self.ensure_exists(bucket_id)?;
        let path = self.metadata_path(bucket_id);
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|err| TallyError::CorruptRecord {
            path,
            reason: err.to_string(),
        })
    }

    fn get(
        &self,
        bucket_id: &str,
        limit: Option<usize>,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
    ) -> Result<Vec<Event>> {
        self.ensure_exists(bucket_id)?;
        let log = self.read_log(bucket_id)?;
        Ok(select_events(log, limit, start, end))
    }

    fn insert_one(&self, bucket_id: &str, event: Event) -> Result<()> {
        self.insert_many(bucket_id, vec![event])
    }

    fn insert_many(&self, bucket_id: &str, events: Vec<Event>) -> Result<()> {
        let mut buffer = String::new();
        for event in &events {
            buffer.push_str(&encode_line(event)?);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|err| err.into_inner());
        self.ensure_exists(bucket_id)?;
        if events.is_empty() {
            return Ok(());
        }

        let path = self.events_path(bucket_id);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        let removed = truncate_torn_tail(&mut file)?;
        if removed > 0 {
            warn!(path = %path.display(), bytes = removed, "Truncated torn event record");
        }
        file.write_all(buffer.as_bytes())?;
        file.sync_data()?;

        debug!(bucket = %bucket_id, count = events.len(), "Appended events");
        Ok(())
    }
}
