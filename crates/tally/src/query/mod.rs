//! Query evaluation.
//!
//! A query is a JSON document naming bucket transforms:
//!
//! ```json
//! {
//!   "transforms": [{
//!     "bucket": "window",
//!     "filters": [
//!       {"name": "timeperiod_intersect",
//!        "transforms": [{"bucket": "afk",
//!                        "filters": [{"name": "include_labels", "labels": ["not-afk"]}]}]}
//!     ]
//!   }],
//!   "chunk": false
//! }
//! ```
//!
//! Documents are parsed into [`Query`] values through a [`FilterRegistry`]
//! and evaluated by a [`QueryEngine`].

mod ast;
mod engine;
mod registry;

pub use ast::{
    parse_exclude_labels, parse_include_labels, parse_timeperiod_intersect, BucketTransform,
    Filter, Query,
};
pub use engine::{QueryEngine, QueryOptions, QueryResult};
pub use registry::{FilterParser, FilterRegistry};

use crate::datastore::Datastore;
use crate::error::Result;
use serde_json::Value;

/// Evaluates a query document with the standard filters.
pub fn query(doc: &Value, datastore: &Datastore, options: &QueryOptions) -> Result<QueryResult> {
    let registry = FilterRegistry::standard();
    QueryEngine::new(datastore, &registry).query(doc, options)
}
