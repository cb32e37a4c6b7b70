//! Document update operators.

use serde_json::{Map, Value};

use crate::document::Document;
use crate::r#trait::StoreError;

/// Field modifications applied to a single matched document.
///
/// Operations run in a fixed order: `$set`, then `$unset`, then `$inc`.
/// Paths may be dotted; intermediate objects are created by `$set` and `$inc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Vec<(String, Value)>,
    pub unset: Vec<String>,
    pub inc: Vec<(String, i64)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((path.into(), value.into()));
        self
    }

    /// `$set` every top-level field of `doc`.
    pub fn set_all(mut self, doc: Document) -> Self {
        self.set.extend(doc);
        self
    }

    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.unset.push(path.into());
        self
    }

    pub fn inc(mut self, path: impl Into<String>, by: i64) -> Self {
        self.inc.push((path.into(), by));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.inc.is_empty()
    }

    /// Apply to `doc` in place. Returns whether anything changed.
    pub fn apply(&self, doc: &mut Document) -> Result<bool, StoreError> {
        let before = doc.clone();

        for (path, value) in &self.set {
            *slot(doc, path)? = value.clone();
        }

        for path in &self.unset {
            remove(doc, path);
        }

        for (path, by) in &self.inc {
            let target = slot(doc, path)?;
            *target = match &*target {
                Value::Null => Value::from(*by),
                Value::Number(n) => match n.as_i64() {
                    Some(current) => Value::from(current.checked_add(*by).ok_or_else(|| {
                        StoreError::InvalidOperation(format!("$inc overflow on '{path}'"))
                    })?),
                    None => {
                        return Err(StoreError::InvalidOperation(format!(
                            "$inc on non-integer field '{path}'"
                        )));
                    }
                },
                other => {
                    return Err(StoreError::InvalidOperation(format!(
                        "$inc on non-numeric field '{path}' ({other})"
                    )));
                }
            };
        }

        Ok(*doc != before)
    }
}

/// Mutable reference to the value at `path`, creating missing objects (and a
/// `null` leaf) along the way.
fn slot<'a>(doc: &'a mut Document, path: &str) -> Result<&'a mut Value, StoreError> {
    let mut segments = path.split('.').peekable();
    let mut current: &mut Map<String, Value> = doc;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            return Ok(current.entry(segment.to_string()).or_insert(Value::Null));
        }

        let next = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match next {
            Value::Object(map) => map,
            _ => {
                return Err(StoreError::InvalidOperation(format!(
                    "cannot traverse non-object field '{segment}' in '{path}'"
                )));
            }
        };
    }

    Err(StoreError::InvalidOperation("empty update path".to_string()))
}

fn remove(doc: &mut Document, path: &str) {
    match path.rsplit_once('.') {
        None => {
            doc.remove(path);
        }
        Some((parent, leaf)) => {
            let mut current: &mut Map<String, Value> = doc;
            for segment in parent.split('.') {
                match current.get_mut(segment) {
                    Some(Value::Object(map)) => current = map,
                    _ => return,
                }
            }
            current.remove(leaf);
        }
    }
}
