//! Listing queries: equality filter, single-field numeric sort, limit.
//!
//! The JSON backend evaluates queries in memory with [`ListQuery::run`]; the
//! database backend translates the same query into SQL. Both must return the
//! same records in the same order.

use std::cmp::Ordering;
use std::str::FromStr;

use models::document::{sort_key, values_equal};
use models::Document;
use serde_json::Value;

use crate::errors::StoreError;

/// Sort order for a listing.
///
/// Parsed from the field-name convention callers use: `-exp` and a bare `exp`
/// sort highest first, `+exp` sorts lowest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn descending(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: true }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: false }
    }
}

impl FromStr for SortSpec {
    type Err = StoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (field, descending) = match raw.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => match raw.strip_prefix('+') {
                Some(rest) => (rest, false),
                None => (raw, true),
            },
        };
        if field.is_empty() || field.contains('.') {
            return Err(StoreError::Validation(format!("invalid sort field: {raw:?}")));
        }
        Ok(Self { field: field.to_string(), descending })
    }
}

/// Conjunction of `field == value` conditions on top-level fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter(Vec<(String, Value)>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| doc.get(field).is_some_and(|v| values_equal(v, expected)))
    }

    fn validate(&self) -> Result<(), StoreError> {
        match self.0.iter().find(|(field, _)| field.is_empty()) {
            Some(_) => Err(StoreError::Validation("filter field must not be empty".into())),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListQuery {
    pub sort: SortSpec,
    /// Zero means no limit.
    pub limit: usize,
    pub filter: Filter,
}

impl ListQuery {
    pub fn new(sort: SortSpec, limit: usize, filter: Filter) -> Result<Self, StoreError> {
        filter.validate()?;
        Ok(Self { sort, limit, filter })
    }

    /// Parse `sort` with the field-name convention of [`SortSpec`].
    pub fn parse(sort: &str, limit: usize, filter: Filter) -> Result<Self, StoreError> {
        Self::new(sort.parse()?, limit, filter)
    }

    /// Evaluate in memory. `docs` must be in storage order; equal sort keys
    /// keep that order.
    pub fn run<I>(&self, docs: I, defaults: &Document) -> Vec<Document>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut hits: Vec<(f64, Document)> = docs
            .into_iter()
            .filter_map(|doc| {
                let effective = overlay(defaults, &doc);
                self.filter
                    .matches(&effective)
                    .then(|| (sort_key(effective.get(&self.sort.field)), doc))
            })
            .collect();

        hits.sort_by(|(a, _), (b, _)| {
            let ord = a.partial_cmp(b).unwrap_or(Ordering::Equal);
            if self.sort.descending { ord.reverse() } else { ord }
        });
        if self.limit > 0 {
            hits.truncate(self.limit);
        }
        hits.into_iter().map(|(_, doc)| doc).collect()
    }
}

/// Shallow overlay: every top-level key of `doc` replaces the default's.
fn overlay(defaults: &Document, doc: &Document) -> Document {
    let mut out = defaults.clone();
    for (k, v) in doc {
        out.insert(k.clone(), v.clone());
    }
    out
}
