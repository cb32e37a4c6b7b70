//! MongoDB-backed [`DocumentStore`].
//!
//! Documents cross the boundary as relaxed extended JSON, so numbers, strings
//! and nested objects round-trip unchanged. The server-assigned `_id` is never
//! returned; identity lives in the caller's own fields.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, Bson, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::document::Document;
use crate::filter::Filter;
use crate::r#trait::{DocumentStore, FindOptions, StoreError, UpdateOutcome};
use crate::update::Update;

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Clone)]
pub struct MongoDocumentStore {
    database: Database,
}

impl MongoDocumentStore {
    /// Connect to `uri` and use `database` for every collection.
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| StoreError::Unavailable(format!("connect to {uri}: {e}")))?;
        debug!(database, "connected to mongodb");
        Ok(Self::from_database(client.database(database)))
    }

    pub fn from_database(database: Database) -> Self {
        Self { database }
    }

    fn collection(&self, name: &str) -> Collection<bson::Document> {
        self.database.collection(name)
    }
}

fn projection() -> bson::Document {
    doc! { "_id": 0 }
}

fn to_bson(value: &Value) -> Result<Bson, StoreError> {
    Bson::try_from(value.clone())
        .map_err(|e| StoreError::InvalidOperation(format!("value not representable in bson: {e}")))
}

fn to_bson_document(document: Document) -> Result<bson::Document, StoreError> {
    match to_bson(&Value::Object(document))? {
        Bson::Document(doc) => Ok(doc),
        other => Err(StoreError::InvalidOperation(format!(
            "expected a document, got {other}"
        ))),
    }
}

fn from_bson_document(document: bson::Document) -> Result<Document, StoreError> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Unavailable(format!(
            "store returned a non-document value: {other}"
        ))),
    }
}

fn operator(path: &str, op: &str, value: &Value) -> Result<bson::Document, StoreError> {
    Ok(doc! { path: { op: to_bson(value)? } })
}

/// Translate a [`Filter`] into a MongoDB query document.
fn filter_to_bson(filter: &Filter) -> Result<bson::Document, StoreError> {
    Ok(match filter {
        Filter::All => bson::Document::new(),
        Filter::Eq(path, v) => operator(path, "$eq", v)?,
        Filter::Ne(path, v) => operator(path, "$ne", v)?,
        Filter::Lt(path, v) => operator(path, "$lt", v)?,
        Filter::Lte(path, v) => operator(path, "$lte", v)?,
        Filter::Gt(path, v) => operator(path, "$gt", v)?,
        Filter::Gte(path, v) => operator(path, "$gte", v)?,
        Filter::In(path, values) => {
            let values = values.iter().map(to_bson).collect::<Result<Vec<_>, _>>()?;
            doc! { path.as_str(): { "$in": values } }
        }
        Filter::Exists(path, present) => doc! { path.as_str(): { "$exists": *present } },
        Filter::And(filters) if filters.is_empty() => bson::Document::new(),
        Filter::And(filters) => doc! { "$and": combine(filters)? },
        // `$or` rejects an empty array.
        Filter::Or(filters) if filters.is_empty() => doc! { "$expr": false },
        Filter::Or(filters) => doc! { "$or": combine(filters)? },
    })
}

fn combine(filters: &[Filter]) -> Result<Vec<bson::Document>, StoreError> {
    filters.iter().map(filter_to_bson).collect()
}

fn update_to_bson(update: &Update) -> Result<bson::Document, StoreError> {
    let mut out = bson::Document::new();

    if !update.set.is_empty() {
        let mut set = bson::Document::new();
        for (path, value) in &update.set {
            set.insert(path.as_str(), to_bson(value)?);
        }
        out.insert("$set", set);
    }
    if !update.unset.is_empty() {
        let mut unset = bson::Document::new();
        for path in &update.unset {
            unset.insert(path.as_str(), "");
        }
        out.insert("$unset", unset);
    }
    if !update.inc.is_empty() {
        let mut inc = bson::Document::new();
        for (path, by) in &update.inc {
            inc.insert(path.as_str(), *by);
        }
        out.insert("$inc", inc);
    }

    Ok(out)
}

fn map_error(collection: &str, err: mongodb::error::Error) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY => {
            StoreError::DuplicateKey {
                collection: collection.to_string(),
                field: String::new(),
                value: we.message.clone(),
            }
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    #[instrument(level = "trace", skip(self, filter))]
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let found = self
            .collection(collection)
            .find_one(filter_to_bson(filter)?)
            .projection(projection())
            .await
            .map_err(|e| map_error(collection, e))?;
        found.map(from_bson_document).transpose()
    }

    #[instrument(level = "trace", skip(self, filter))]
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let mut action = self
            .collection(collection)
            .find(filter_to_bson(filter)?)
            .skip(options.skip)
            .projection(projection());
        if let Some(limit) = options.limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let cursor = action.await.map_err(|e| map_error(collection, e))?;
        let documents: Vec<bson::Document> = cursor
            .try_collect()
            .await
            .map_err(|e| map_error(collection, e))?;
        documents.into_iter().map(from_bson_document).collect()
    }

    #[instrument(level = "trace", skip(self, document))]
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        self.collection(collection)
            .insert_one(to_bson_document(document)?)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, filter, update))]
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateOutcome, StoreError> {
        if update.is_empty() {
            let matched = self.count(collection, filter).await?.min(1);
            return Ok(UpdateOutcome { matched, modified: 0 });
        }

        let result = self
            .collection(collection)
            .update_one(filter_to_bson(filter)?, update_to_bson(update)?)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    #[instrument(level = "trace", skip(self, filter))]
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let result = self
            .collection(collection)
            .delete_one(filter_to_bson(filter)?)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(result.deleted_count)
    }

    #[instrument(level = "trace", skip(self, filter))]
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.collection(collection)
            .count_documents(filter_to_bson(filter)?)
            .await
            .map_err(|e| map_error(collection, e))
    }

    #[instrument(level = "trace", skip(self))]
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        let index = IndexModel::builder()
            .keys(doc! { field: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection(collection)
            .create_index(index)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(())
    }
}
