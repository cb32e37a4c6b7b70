use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::document::Document;
use crate::filter::Filter;
use crate::update::Update;

/// Document store operation error.
///
/// These are **infrastructure errors** (transport, constraint, malformed
/// operation) as opposed to domain errors. Callers decide how each maps onto
/// their own taxonomy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or failed to execute the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A unique index rejected the write.
    #[error("duplicate key in '{collection}': {field} = {value}")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },

    /// The request itself was malformed (e.g. `$inc` on a string).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Paging options for [`DocumentStore::find`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Number of matching documents to skip.
    pub skip: u64,
    /// Maximum number of documents to return; `None` means unbounded.
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn page(skip: u64, limit: Option<u64>) -> Self {
        Self { skip, limit }
    }
}

/// Result of [`DocumentStore::update_one`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Documents that satisfied the filter (0 or 1).
    pub matched: u64,
    /// Documents whose content actually changed.
    pub modified: u64,
}

/// Document-oriented persistence over named collections.
///
/// ## Atomicity
///
/// Implementations must apply [`update_one`](Self::update_one) atomically per
/// document: the filter is evaluated and the update applied as one step, so a
/// concurrent writer can never slip between them. Nothing is guaranteed across
/// two separate calls (e.g. a `find_one` followed by an `update_one`); callers
/// that need read-then-write semantics must re-assert what they read in the
/// update filter and check [`UpdateOutcome::matched`].
///
/// ## Ordering
///
/// `find` and `find_one` return documents in the store's natural order. No
/// other ordering is promised.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter`, if any.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError>;

    /// All documents matching `filter`, paged by `options`.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Insert a new document, enforcing unique indexes.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError>;

    /// Apply `update` to the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Delete the first document matching `filter`. Returns the number deleted.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Number of documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Declare `field` unique within `collection`. Idempotent.
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        (**self).find_one(collection, filter).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        (**self).find(collection, filter, options).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        (**self).insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateOutcome, StoreError> {
        (**self).update_one(collection, filter, update).await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        (**self).delete_one(collection, filter).await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        (**self).count(collection, filter).await
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        (**self).ensure_unique_index(collection, field).await
    }
}
