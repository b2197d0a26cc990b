//! Recursive query evaluation.
//!
//! Evaluation runs in two phases. First the whole query, including nested
//! transforms, is checked against the datastore's bucket list; a reference
//! to a missing bucket aborts the query before any events are read. Then
//! every top-level transform is evaluated and the results are concatenated
//! in order, without merging or deduplication.

use crate::datastore::Datastore;
use crate::error::{Result, TallyError};
use crate::model::{Event, Timestamp};
use crate::query::ast::{BucketTransform, Filter, Query};
use crate::query::registry::FilterRegistry;
use crate::transform::{chunk, exclude_labels, filter_period_intersect, include_labels, ChunkSummary};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Read bounds shared by every bucket read of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Maximum events per bucket read; `<= 0` means unbounded.
    pub limit: i64,
    /// Earliest event timestamp to read.
    pub start: Option<Timestamp>,
    /// Latest event timestamp to read.
    pub end: Option<Timestamp>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: -1,
            start: None,
            end: None,
        }
    }
}

impl QueryOptions {
    /// Sets the per-read event limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the earliest event timestamp.
    pub fn with_start(mut self, start: Timestamp) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the latest event timestamp.
    pub fn with_end(mut self, end: Timestamp) -> Self {
        self.end = Some(end);
        self
    }
}

/// Result of a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    /// Plain event listing.
    Events {
        /// Number of events.
        eventcount: usize,
        /// The events, serialized in their external JSON form.
        eventlist: Vec<Event>,
    },
    /// Per-label summary, produced when the query sets `chunk`.
    Chunked(ChunkSummary),
}

impl QueryResult {
    /// Returns the listed events, or `None` for a chunked result.
    pub fn events(&self) -> Option<&[Event]> {
        match self {
            Self::Events { eventlist, .. } => Some(eventlist),
            Self::Chunked(_) => None,
        }
    }

    /// Returns the JSON document for this result.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Events {
                eventcount,
                eventlist,
            } => serde_json::json!({
                "eventcount": eventcount,
                "eventlist": eventlist.iter().map(Event::to_json).collect::<Vec<_>>(),
            }),
            Self::Chunked(summary) => summary.to_json(),
        }
    }
}

/// Evaluates queries against a datastore.
pub struct QueryEngine<'a> {
    datastore: &'a Datastore,
    registry: &'a FilterRegistry,
}

impl<'a> QueryEngine<'a> {
    /// Creates an engine reading from `datastore` and resolving filter names
    /// through `registry`.
    pub fn new(datastore: &'a Datastore, registry: &'a FilterRegistry) -> Self {
        Self {
            datastore,
            registry,
        }
    }

    /// Parses and evaluates a query document.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::QueryValidation` if the document is malformed or
    /// references a missing bucket, and propagates storage errors.
    pub fn query(&self, doc: &Value, options: &QueryOptions) -> Result<QueryResult> {
        let query = Query::parse(doc, self.registry)?;
        self.evaluate(&query, options)
    }

    /// Evaluates a parsed query.
    pub fn evaluate(&self, query: &Query, options: &QueryOptions) -> Result<QueryResult> {
        self.check_buckets(query.referenced_buckets())?;

        let mut events = Vec::new();
        for transform in &query.transforms {
            events.extend(self.run_transform(transform, options)?);
        }

        if query.chunk {
            Ok(QueryResult::Chunked(chunk(&events)))
        } else {
            Ok(QueryResult::Events {
                eventcount: events.len(),
                eventlist: events,
            })
        }
    }

    /// Evaluates a single bucket transform.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::QueryValidation` if the transform or one of its
    /// nested transforms references a missing bucket.
    pub fn bucket_transform(
        &self,
        transform: &BucketTransform,
        options: &QueryOptions,
    ) -> Result<Vec<Event>> {
        self.check_buckets(transform.referenced_buckets())?;
        self.run_transform(transform, options)
    }

    fn check_buckets<'q>(&self, referenced: impl IntoIterator<Item = &'q str>) -> Result<()> {
        let known = self.datastore.buckets()?;
        for bucket in referenced {
            if !known.contains_key(bucket) {
                return Err(TallyError::validation(format!(
                    "Cannot query bucket that doesn't exist in transform: '{}'",
                    bucket
                )));
            }
        }
        Ok(())
    }

    fn run_transform(&self, transform: &BucketTransform, options: &QueryOptions) -> Result<Vec<Event>> {
        let mut events =
            self.datastore
                .bucket(transform.bucket.as_str())
                .get(options.limit, options.start, options.end)?;
        debug!(
            bucket = %transform.bucket,
            events = events.len(),
            filters = transform.filters.len(),
            "Evaluating transform"
        );

        for filter in &transform.filters {
            events = self.apply_filter(filter, events, options)?;
        }
        Ok(events)
    }

    fn apply_filter(
        &self,
        filter: &Filter,
        events: Vec<Event>,
        options: &QueryOptions,
    ) -> Result<Vec<Event>> {
        match filter {
            // Without a label list nothing matches.
            Filter::IncludeLabels { labels: None } => Ok(Vec::new()),
            Filter::IncludeLabels {
                labels: Some(labels),
            } => Ok(include_labels(events, labels)),
            Filter::ExcludeLabels { labels: None } => Ok(events),
            Filter::ExcludeLabels {
                labels: Some(labels),
            } => Ok(exclude_labels(events, labels)),
            Filter::TimeperiodIntersect { transforms } => {
                let mut filterevents = Vec::new();
                for transform in transforms {
                    filterevents.extend(self.run_transform(transform, options)?);
                }
                Ok(filter_period_intersect(events, filterevents))
            }
        }
    }
}
