//! Filter registry.
//!
//! The registry maps filter names in query documents to parsers producing
//! typed [`Filter`] values. It is built once, is immutable afterwards, and
//! is passed explicitly to the query engine.

use crate::error::{Result, TallyError};
use crate::query::ast::{
    parse_exclude_labels, parse_include_labels, parse_timeperiod_intersect, BucketTransform,
    Filter,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parses the fields of a filter object into a typed filter.
///
/// The registry is passed along so that filters holding nested transforms
/// can parse them.
pub type FilterParser = fn(&Map<String, Value>, &FilterRegistry) -> Result<Filter>;

/// Table of recognized filters.
#[derive(Debug, Clone)]
pub struct FilterRegistry {
    parsers: BTreeMap<&'static str, FilterParser>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl FilterRegistry {
    /// Creates a registry that recognizes no filters.
    pub fn empty() -> Self {
        Self {
            parsers: BTreeMap::new(),
        }
    }

    /// Creates a registry with `include_labels`, `exclude_labels` and
    /// `timeperiod_intersect`.
    pub fn standard() -> Self {
        Self::empty()
            .with_filter("include_labels", parse_include_labels)
            .with_filter("exclude_labels", parse_exclude_labels)
            .with_filter("timeperiod_intersect", parse_timeperiod_intersect)
    }

    /// Registers a filter parser under `name`, replacing any previous one.
    pub fn with_filter(mut self, name: &'static str, parser: FilterParser) -> Self {
        self.parsers.insert(name, parser);
        self
    }

    /// Returns true if a filter named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.parsers.contains_key(name)
    }

    /// Returns the registered filter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.parsers.keys().copied()
    }

    /// Parses a filter object `{name, ...}`.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::QueryValidation` if `name` is missing, is not a
    /// string or is not registered, or if the filter's own fields are
    /// invalid.
    pub fn parse_filter(&self, value: &Value) -> Result<Filter> {
        let obj = value
            .as_object()
            .ok_or_else(|| TallyError::validation(format!("Filter must be an object: {}", value)))?;

        let name = match obj.get("name") {
            None => {
                return Err(TallyError::validation(format!(
                    "No filter specified in transform: {}",
                    value
                )))
            }
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(TallyError::validation(format!(
                    "Invalid filter name in transform: '{}'",
                    other
                )))
            }
        };

        let parser = self.parsers.get(name.as_str()).ok_or_else(|| {
            TallyError::validation(format!("No such filter in transform: '{}'", name))
        })?;
        parser(obj, self)
    }

    /// Parses a transform document using this registry.
    pub fn parse_transform(&self, value: &Value) -> Result<BucketTransform> {
        BucketTransform::parse(value, self)
    }
}
