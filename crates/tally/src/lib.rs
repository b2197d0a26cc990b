//! Tally - Alopex Activity Event Store
//!
//! This crate stores timestamped, duration-bearing events in named buckets
//! and answers recursive transform queries over them.
//!
//! # Components
//!
//! - [`Datastore`]: Bucket store over a pluggable [`StorageStrategy`]
//! - [`TimePeriod`] / [`Event`]: Interval algebra and event model
//! - [`transform`]: Period intersection, union, label filters and chunking
//! - [`QueryEngine`]: Parsing and evaluation of query documents
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_tally::{query, BucketMetadata, Datastore, QueryOptions};
//! use serde_json::json;
//!
//! let datastore = Datastore::in_memory();
//! let bucket = datastore.create_bucket(BucketMetadata::new(
//!     "window", "currentwindow", "watcher", "host", created,
//! ))?;
//! bucket.insert_many(events)?;
//!
//! let result = query::query(
//!     &json!({"transforms": [{"bucket": "window"}]}),
//!     &datastore,
//!     &QueryOptions::default(),
//! )?;
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod datastore;
pub mod error;
pub mod model;
pub mod query;
pub mod storage;
pub mod transform;

pub use config::{DatastoreConfig, StorageMethod};
pub use datastore::{BucketHandle, Datastore};
pub use error::{Result, TallyError};
pub use model::{Event, EventData, TimePeriod, Timestamp};
pub use query::{
    BucketTransform, Filter, FilterRegistry, Query, QueryEngine, QueryOptions, QueryResult,
};
pub use storage::{BucketMetadata, FileStorage, MemoryStorage, RedbStorage, StorageStrategy};
