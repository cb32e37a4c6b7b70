use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::document::{Document, values_equal};
use crate::filter::Filter;
use crate::r#trait::{DocumentStore, FindOptions, StoreError, UpdateOutcome};
use crate::update::Update;

#[derive(Debug, Default)]
struct Collection {
    /// Natural (insertion) order.
    documents: Vec<Document>,
    unique_fields: BTreeSet<String>,
}

impl Collection {
    /// First unique-index violation `candidate` would cause, ignoring the
    /// document at `skip` (the one being replaced).
    fn violation(&self, candidate: &Document, skip: Option<usize>) -> Option<(String, String)> {
        for field in &self.unique_fields {
            let Some(value) = candidate.get(field) else {
                continue;
            };
            let clash = self
                .documents
                .iter()
                .enumerate()
                .filter(|(idx, _)| Some(*idx) != skip)
                .any(|(_, doc)| doc.get(field).is_some_and(|v| values_equal(v, value)));
            if clash {
                return Some((field.clone(), value.to_string()));
            }
        }
        None
    }
}

/// In-memory document store.
///
/// Intended for tests/dev. Not optimized for performance: every query is a
/// scan. Each operation takes the collection lock once, which gives the
/// per-document atomicity the [`DocumentStore`] contract requires.
///
/// Two test hooks simulate a misbehaving backend:
/// - [`set_available(false)`](Self::set_available) makes every call fail with
///   [`StoreError::Unavailable`];
/// - [`set_latency`](Self::set_latency) delays every call before it touches
///   the data.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (`false`) or recovery (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay applied to every subsequent call.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Copy of every document in `collection`, in natural order.
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .map(|c| {
                c.get(collection)
                    .map(|c| c.documents.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    async fn enter(&self, op: &'static str, collection: &str) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "{op} on '{collection}': in-memory store is offline"
            )));
        }
        trace!(op, collection, "in-memory store call");
        Ok(())
    }

    fn read<T>(
        &self,
        collection: &str,
        f: impl FnOnce(Option<&Collection>) -> T,
    ) -> Result<T, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(collections.get(collection)))
    }

    fn write<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Collection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        f(collections.entry(collection.to_string()).or_default())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        self.enter("find_one", collection).await?;
        self.read(collection, |c| {
            c.and_then(|c| c.documents.iter().find(|d| filter.matches(d)).cloned())
        })
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.enter("find", collection).await?;
        self.read(collection, |c| {
            let Some(c) = c else {
                return Vec::new();
            };
            let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
            let limit = options
                .limit
                .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
                .unwrap_or(usize::MAX);
            c.documents
                .iter()
                .filter(|d| filter.matches(d))
                .skip(skip)
                .take(limit)
                .cloned()
                .collect()
        })
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        self.enter("insert_one", collection).await?;
        self.write(collection, |c| {
            if let Some((field, value)) = c.violation(&document, None) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    field,
                    value,
                });
            }
            c.documents.push(document);
            Ok(())
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateOutcome, StoreError> {
        self.enter("update_one", collection).await?;
        self.write(collection, |c| {
            let Some(idx) = c.documents.iter().position(|d| filter.matches(d)) else {
                return Ok(UpdateOutcome::default());
            };

            // Apply to a copy so a rejected update leaves the stored document intact.
            let mut updated = c.documents[idx].clone();
            let changed = update.apply(&mut updated)?;
            if let Some((field, value)) = c.violation(&updated, Some(idx)) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    field,
                    value,
                });
            }
            c.documents[idx] = updated;

            Ok(UpdateOutcome {
                matched: 1,
                modified: u64::from(changed),
            })
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.enter("delete_one", collection).await?;
        self.write(collection, |c| {
            match c.documents.iter().position(|d| filter.matches(d)) {
                Some(idx) => {
                    c.documents.remove(idx);
                    Ok(1)
                }
                None => Ok(0),
            }
        })
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.enter("count", collection).await?;
        self.read(collection, |c| {
            c.map(|c| c.documents.iter().filter(|d| filter.matches(d)).count() as u64)
                .unwrap_or(0)
        })
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        self.enter("ensure_unique_index", collection).await?;
        self.write(collection, |c| {
            c.unique_fields.insert(field.to_string());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn insert_find_and_count() {
        let store = InMemoryDocumentStore::new();
        store.insert_one("job", doc(json!({ "name": "a" }))).await.unwrap();
        store.insert_one("job", doc(json!({ "name": "b", "state": "idle" }))).await.unwrap();

        let found = store.find_one("job", &Filter::eq("name", "b")).await.unwrap();
        assert_eq!(found.unwrap()["state"], json!("idle"));

        assert_eq!(store.count("job", &Filter::All).await.unwrap(), 2);
        assert_eq!(store.count("other", &Filter::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_pages_in_natural_order() {
        let store = InMemoryDocumentStore::new();
        for i in 0..5 {
            store.insert_one("job", doc(json!({ "name": format!("j{i}") }))).await.unwrap();
        }

        let page = store
            .find("job", &Filter::All, FindOptions::page(1, Some(2)))
            .await
            .unwrap();
        let names: Vec<_> = page.iter().map(|d| d["name"].clone()).collect();
        assert_eq!(names, vec![json!("j1"), json!("j2")]);

        let rest = store
            .find("job", &Filter::All, FindOptions::page(3, None))
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicates() {
        let store = InMemoryDocumentStore::new();
        store.ensure_unique_index("job", "name").await.unwrap();
        store.insert_one("job", doc(json!({ "name": "a" }))).await.unwrap();

        let err = store
            .insert_one("job", doc(json!({ "name": "a" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { ref field, .. } if field == "name"));
        assert_eq!(store.count("job", &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_reports_match_count() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_one("job", doc(json!({ "name": "a", "version": 0 })))
            .await
            .unwrap();

        let guard = Filter::and([Filter::eq("name", "a"), Filter::eq("version", 0)]);
        let bump = Update::new().inc("version", 1);

        let first = store.update_one("job", &guard, &bump).await.unwrap();
        assert_eq!(first, UpdateOutcome { matched: 1, modified: 1 });

        let stale = store.update_one("job", &guard, &bump).await.unwrap();
        assert_eq!(stale.matched, 0);
    }

    #[tokio::test]
    async fn failed_update_leaves_document_intact() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_one("job", doc(json!({ "name": "a", "version": "x" })))
            .await
            .unwrap();

        let update = Update::new().set("state", "idle").inc("version", 1);
        let err = store.update_one("job", &Filter::eq("name", "a"), &update).await;
        assert!(err.is_err());
        assert_eq!(
            Value::Object(store.snapshot("job").remove(0)),
            json!({ "name": "a", "version": "x" })
        );
    }

    #[tokio::test]
    async fn delete_removes_first_match_only() {
        let store = InMemoryDocumentStore::new();
        store.insert_one("repository", doc(json!({ "name": "a", "k": 1 }))).await.unwrap();
        store.insert_one("repository", doc(json!({ "name": "b", "k": 1 }))).await.unwrap();

        assert_eq!(store.delete_one("repository", &Filter::eq("k", 1)).await.unwrap(), 1);
        assert_eq!(store.delete_one("repository", &Filter::eq("k", 2)).await.unwrap(), 0);
        assert_eq!(store.snapshot("repository")[0]["name"], json!("b"));
    }

    #[tokio::test]
    async fn outage_surfaces_as_unavailable() {
        let store = InMemoryDocumentStore::new();
        store.set_available(false);

        let err = store.count("job", &Filter::All).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        store.set_available(true);
        assert_eq!(store.count("job", &Filter::All).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_guarded_updates_have_one_winner() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .insert_one("job", doc(json!({ "name": "a", "version": 0 })))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let guard = Filter::and([Filter::eq("name", "a"), Filter::eq("version", 0)]);
                store
                    .update_one("job", &guard, &Update::new().inc("version", 1))
                    .await
                    .unwrap()
                    .matched
            }));
        }

        let mut winners = 0;
        for handle in handles {
            winners += handle.await.unwrap();
        }
        assert_eq!(winners, 1);
    }
}
