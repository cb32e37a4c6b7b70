//! Conversion between domain records and stored documents.

use dataaccess_store::{Document, Update};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AccessError, AccessResult};

pub(crate) fn to_document<T: Serialize>(record: &T) -> AccessResult<Document> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AccessError::Validation(format!(
            "record does not serialise to a document: {other}"
        ))),
        Err(e) => Err(AccessError::Validation(e.to_string())),
    }
}

pub(crate) fn from_document<T: DeserializeOwned>(document: Document) -> AccessResult<T> {
    serde_json::from_value(Value::Object(document)).map_err(|e| AccessError::Corrupt(e.to_string()))
}

/// Update that turns `current` into `next`: every field of `next` is set and
/// fields only `current` has are unset.
pub(crate) fn replacement(current: &Document, next: Document) -> Update {
    let stale: Vec<String> = current
        .keys()
        .filter(|key| !next.contains_key(*key))
        .cloned()
        .collect();

    stale
        .into_iter()
        .fold(Update::new().set_all(next), |update, key| update.unset(key))
}
