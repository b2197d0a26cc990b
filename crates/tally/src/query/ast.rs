//! Typed form of query documents.
//!
//! A query document is parsed into a [`Query`] before anything is read, so
//! shape errors abort the whole query without producing partial results.

use crate::error::{Result, TallyError};
use crate::query::registry::FilterRegistry;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A parsed query: independent bucket transforms whose results are
/// concatenated.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Top-level transforms, evaluated in order.
    pub transforms: Vec<BucketTransform>,
    /// Summarize the result per label instead of listing events.
    pub chunk: bool,
}

/// A bucket read followed by a pipeline of filters.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketTransform {
    /// Bucket to read.
    pub bucket: String,
    /// Filters applied in declaration order.
    pub filters: Vec<Filter>,
}

/// A filter stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Keep events carrying any of `labels`. Without a label list nothing
    /// is kept.
    IncludeLabels {
        /// Labels to keep, if given.
        labels: Option<Vec<String>>,
    },
    /// Drop events carrying any of `labels`. Without a label list every
    /// event is kept.
    ExcludeLabels {
        /// Labels to drop, if given.
        labels: Option<Vec<String>>,
    },
    /// Clip events to the periods covered by the concatenated results of
    /// nested transforms.
    TimeperiodIntersect {
        /// Transforms producing the filter periods.
        transforms: Vec<BucketTransform>,
    },
}

impl Filter {
    /// Name of the filter in query documents.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IncludeLabels { .. } => "include_labels",
            Self::ExcludeLabels { .. } => "exclude_labels",
            Self::TimeperiodIntersect { .. } => "timeperiod_intersect",
        }
    }
}

impl Query {
    /// Parses a query document, resolving filters through `registry`.
    ///
    /// Unknown top-level fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::QueryValidation` if the document is malformed.
    pub fn parse(doc: &Value, registry: &FilterRegistry) -> Result<Query> {
        let obj = doc
            .as_object()
            .ok_or_else(|| TallyError::validation(format!("Query must be an object: {}", doc)))?;

        let transforms = parse_transform_list(obj, "query", registry)?;
        let chunk = match obj.get("chunk") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(chunk)) => *chunk,
            Some(other) => {
                return Err(TallyError::validation(format!(
                    "Invalid chunk flag in query: '{}'",
                    other
                )))
            }
        };

        Ok(Query { transforms, chunk })
    }

    /// Returns every bucket referenced anywhere in the query, including
    /// nested transforms.
    pub fn referenced_buckets(&self) -> BTreeSet<&str> {
        let mut buckets = BTreeSet::new();
        for transform in &self.transforms {
            transform.collect_buckets(&mut buckets);
        }
        buckets
    }
}

impl BucketTransform {
    /// Creates a transform without filters.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            filters: Vec::new(),
        }
    }

    /// Appends a filter stage.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Parses a transform document `{bucket, filters?}`.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::QueryValidation` if `bucket` is missing or not
    /// a string, if `filters` is not a list, or if a filter is invalid.
    pub fn parse(value: &Value, registry: &FilterRegistry) -> Result<BucketTransform> {
        let obj = value.as_object().ok_or_else(|| {
            TallyError::validation(format!("Transform must be an object: {}", value))
        })?;

        let bucket = match obj.get("bucket") {
            None => {
                return Err(TallyError::validation(format!(
                    "No bucket specified in transform: {}",
                    value
                )))
            }
            Some(Value::String(bucket)) => bucket.clone(),
            Some(other) => {
                return Err(TallyError::validation(format!(
                    "Invalid bucket name in transform: '{}'",
                    other
                )))
            }
        };

        let filters = match obj.get("filters") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(filters)) => filters
                .iter()
                .map(|filter| registry.parse_filter(filter))
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(TallyError::validation(format!(
                    "Filters must be a list in transform: '{}'",
                    other
                )))
            }
        };

        Ok(BucketTransform { bucket, filters })
    }

    /// Returns every bucket this transform reads, including nested ones.
    pub fn referenced_buckets(&self) -> BTreeSet<&str> {
        let mut buckets = BTreeSet::new();
        self.collect_buckets(&mut buckets);
        buckets
    }

    fn collect_buckets<'a>(&'a self, buckets: &mut BTreeSet<&'a str>) {
        buckets.insert(self.bucket.as_str());
        for filter in &self.filters {
            if let Filter::TimeperiodIntersect { transforms } = filter {
                for transform in transforms {
                    transform.collect_buckets(buckets);
                }
            }
        }
    }
}

/// Parses the `transforms` list of a query or filter object.
pub(crate) fn parse_transform_list(
    obj: &Map<String, Value>,
    context: &str,
    registry: &FilterRegistry,
) -> Result<Vec<BucketTransform>> {
    match obj.get("transforms") {
        Some(Value::Array(transforms)) => transforms
            .iter()
            .map(|transform| BucketTransform::parse(transform, registry))
            .collect(),
        Some(other) => Err(TallyError::validation(format!(
            "Transforms must be a list in {}: '{}'",
            context, other
        ))),
        None => Err(TallyError::validation(format!(
            "No transforms specified in {}",
            context
        ))),
    }
}

/// Parses an optional `labels` list of strings.
pub(crate) fn parse_labels(obj: &Map<String, Value>) -> Result<Option<Vec<String>>> {
    let labels = match obj.get("labels") {
        None => return Ok(None),
        Some(Value::Array(labels)) => labels,
        Some(other) => {
            return Err(TallyError::validation(format!(
                "Labels must be a list of strings: '{}'",
                other
            )))
        }
    };

    labels
        .iter()
        .map(|label| {
            label.as_str().map(str::to_string).ok_or_else(|| {
                TallyError::validation(format!("Invalid label in filter: '{}'", label))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Parses an `include_labels` filter.
pub fn parse_include_labels(obj: &Map<String, Value>, _registry: &FilterRegistry) -> Result<Filter> {
    Ok(Filter::IncludeLabels {
        labels: parse_labels(obj)?,
    })
}

/// Parses an `exclude_labels` filter.
pub fn parse_exclude_labels(obj: &Map<String, Value>, _registry: &FilterRegistry) -> Result<Filter> {
    Ok(Filter::ExcludeLabels {
        labels: parse_labels(obj)?,
    })
}

/// Parses a `timeperiod_intersect` filter and its nested transforms.
pub fn parse_timeperiod_intersect(
    obj: &Map<String, Value>,
    registry: &FilterRegistry,
) -> Result<Filter> {
    Ok(Filter::TimeperiodIntersect {
        transforms: parse_transform_list(obj, "timeperiod_intersect filter", registry)?,
    })
}
