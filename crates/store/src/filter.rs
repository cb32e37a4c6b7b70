//! Filter predicate trees.
//!
//! A [`Filter`] selects documents in a collection. It is evaluated directly by
//! the in-memory store and translated to the native query language by other
//! backends, so the same tree means the same thing everywhere.
//!
//! ## Semantics
//!
//! - Field paths are dotted (`dependencies.name`) and traverse arrays.
//! - `Eq`, `In` and the ordering operators match when **any** value at the path
//!   satisfies them. A missing field satisfies none of them.
//! - `Ne` is the negation of `Eq`, so it also matches documents missing the
//!   field.
//! - Ordering operators only compare values of the same kind (number with
//!   number, string with string).
//! - `And([])` matches everything, `Or([])` matches nothing.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::{Document, compare, values_at, values_equal};

/// Document predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    /// `true`: the field is present (even if null); `false`: it is absent.
    Exists(String, bool),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(path.into(), value.into())
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(path.into(), value.into())
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(path.into(), value.into())
    }

    pub fn lte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte(path.into(), value.into())
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(path.into(), value.into())
    }

    pub fn gte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte(path.into(), value.into())
    }

    pub fn is_in<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(path.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Self::Exists(path.into(), true)
    }

    pub fn missing(path: impl Into<String>) -> Self {
        Self::Exists(path.into(), false)
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    /// Evaluate the predicate against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, expected) => {
                values_at(doc, path).into_iter().any(|v| values_equal(v, expected))
            }
            Filter::Ne(path, expected) => {
                !values_at(doc, path).into_iter().any(|v| values_equal(v, expected))
            }
            Filter::Lt(path, bound) => any_ordering(doc, path, bound, |o| o == Ordering::Less),
            Filter::Lte(path, bound) => any_ordering(doc, path, bound, |o| o != Ordering::Greater),
            Filter::Gt(path, bound) => any_ordering(doc, path, bound, |o| o == Ordering::Greater),
            Filter::Gte(path, bound) => any_ordering(doc, path, bound, |o| o != Ordering::Less),
            Filter::In(path, candidates) => values_at(doc, path)
                .into_iter()
                .any(|v| candidates.iter().any(|c| values_equal(v, c))),
            Filter::Exists(path, expected) => !values_at(doc, path).is_empty() == *expected,
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

fn any_ordering(doc: &Document, path: &str, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    values_at(doc, path)
        .into_iter()
        .filter_map(|v| compare(v, bound))
        .any(accept)
}
