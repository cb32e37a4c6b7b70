//! Documents and field-path resolution.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// A stored document: a JSON object keyed by top-level field name.
pub type Document = Map<String, Value>;

/// Resolve a dotted `path` against `doc`.
///
/// Arrays are traversed element-wise, so `dependencies.name` yields the `name`
/// of every element of `dependencies`. When the path ends on an array, both the
/// array itself and each of its elements are returned, which lets equality
/// predicates match "array contains value".
pub fn values_at<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };

    let mut current: Vec<&Value> = doc.get(first).into_iter().collect();
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => next.extend(map.get(segment)),
                Value::Array(items) => {
                    for item in items {
                        if let Value::Object(map) = item {
                            next.extend(map.get(segment));
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    let mut resolved = Vec::with_capacity(current.len());
    for value in current {
        resolved.push(value);
        if let Value::Array(items) = value {
            resolved.extend(items.iter());
        }
    }
    resolved
}

/// Order two values of the same kind. Mixed kinds are incomparable.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Equality with numeric normalisation (`1` equals `1.0`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}
