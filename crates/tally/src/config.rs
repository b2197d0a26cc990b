//! Datastore configuration.
//!
//! The configuration selects exactly one storage strategy for the lifetime
//! of a [`Datastore`](crate::Datastore). It can be built in code with the
//! `with_*` methods or deserialized from an embedding application's own
//! configuration file:
//!
//! ```json
//! { "storage": { "method": "files", "path": "/var/lib/tally" }, "testing": false }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix appended to the redb file stem in testing mode.
const TESTING_SUFFIX: &str = "-testing";

/// Directory used below the file storage root in testing mode.
const TESTING_DIR: &str = "testing";

/// Storage strategy selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum StorageMethod {
    /// Keep everything in memory (default).
    #[default]
    Memory,
    /// One directory per bucket below `path`.
    Files {
        /// Root directory.
        path: PathBuf,
    },
    /// A single redb database file.
    Redb {
        /// Database file path.
        path: PathBuf,
    },
}

impl StorageMethod {
    /// Returns the path the backend should use, namespaced for testing
    /// when `testing` is set. Returns `None` for in-memory storage.
    pub fn resolved_path(&self, testing: bool) -> Option<PathBuf> {
        match self {
            Self::Memory => None,
            Self::Files { path } if testing => Some(path.join(TESTING_DIR)),
            Self::Files { path } => Some(path.clone()),
            Self::Redb { path } if testing => Some(testing_file_name(path)),
            Self::Redb { path } => Some(path.clone()),
        }
    }
}

fn testing_file_name(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{}{}", stem, TESTING_SUFFIX);
    if let Some(ext) = path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(name)
}

/// Configuration for opening a [`Datastore`](crate::Datastore).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Storage strategy.
    pub storage: StorageMethod,
    /// Keep data apart from production data.
    pub testing: bool,
}

impl DatastoreConfig {
    /// Creates a configuration for the given storage strategy.
    pub fn new(storage: StorageMethod) -> Self {
        Self {
            storage,
            testing: false,
        }
    }

    /// Sets the storage strategy.
    pub fn with_storage(mut self, storage: StorageMethod) -> Self {
        self.storage = storage;
        self
    }

    /// Enables or disables the testing namespace.
    pub fn with_testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_memory() {
        let config = DatastoreConfig::default();
        assert_eq!(config.storage, StorageMethod::Memory);
        assert!(!config.testing);
        assert_eq!(config.storage.resolved_path(true), None);
    }

    #[test]
    fn test_deserialize_files() {
        let config: DatastoreConfig = serde_json::from_value(json!({
            "storage": {"method": "files", "path": "/data/tally"},
            "testing": true
        }))
        .unwrap();
        assert_eq!(
            config.storage,
            StorageMethod::Files {
                path: PathBuf::from("/data/tally")
            }
        );
        assert!(config.testing);
    }

    #[test]
    fn test_deserialize_missing_fields_use_defaults() {
        let config: DatastoreConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, DatastoreConfig::default());
    }

    #[test]
    fn test_testing_paths() {
        let files = StorageMethod::Files {
            path: PathBuf::from("/data"),
        };
        assert_eq!(files.resolved_path(false), Some(PathBuf::from("/data")));
        assert_eq!(files.resolved_path(true), Some(PathBuf::from("/data/testing")));

        let redb = StorageMethod::Redb {
            path: PathBuf::from("/data/tally.redb"),
        };
        assert_eq!(redb.resolved_path(false), Some(PathBuf::from("/data/tally.redb")));
        assert_eq!(
            redb.resolved_path(true),
            Some(PathBuf::from("/data/tally-testing.redb"))
        );
    }

    #[test]
    fn test_builder() {
        let config = DatastoreConfig::default()
            .with_storage(StorageMethod::Redb {
                path: PathBuf::from("db.redb"),
            })
            .with_testing(true);
        assert!(config.testing);
        assert!(matches!(config.storage, StorageMethod::Redb { .. }));
    }
}
