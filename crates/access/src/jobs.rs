//! Job record store.
//!
//! CRUD over the `job` collection plus the two lease operations:
//!
//! - **Claim** picks one eligible job and moves it to `in_progress`. It is a
//!   read followed by a conditional write: the write only applies if the
//!   document still has the name, version and eligibility that were read. If
//!   another worker got there first the write matches nothing and the caller
//!   gets [`AccessError::Conflict`]. Exactly one concurrent claimer wins.
//! - **Release** moves a claimed job back to `idle`. The write is guarded on
//!   the version the claim produced, so only the current holder can release.
//!   Releasing an idle job is a no-op.
//!
//! Nothing here caches; every call reads the store through the caller's
//! [`Scope`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dataaccess_core::{Entity, Job, JobRecord, StateTag};
use dataaccess_store::{Document, Filter, Update};
use tracing::{debug, instrument, warn};

use crate::error::{AccessError, AccessResult};
use crate::lease::{LeasePolicy, fields, version_guard};
use crate::pagination::Pagination;
use crate::record::{from_document, replacement, to_document};
use crate::scope::Scope;

const COLLECTION: &str = Job::COLLECTION;

#[derive(Debug, Clone, Default)]
pub struct JobDao {
    lease: LeasePolicy,
}

impl JobDao {
    pub fn new(lease: LeasePolicy) -> Self {
        Self { lease }
    }

    pub fn lease(&self) -> &LeasePolicy {
        &self.lease
    }

    /// Declare the unique `name` index. Call once at startup; duplicate
    /// detection in [`create`](Self::create) relies on it.
    pub async fn ensure_indexes(&self, scope: &Scope) -> AccessResult<()> {
        scope
            .run(scope.store().ensure_unique_index(COLLECTION, fields::NAME))
            .await
    }

    #[instrument(level = "debug", skip(self, scope))]
    pub async fn get(&self, scope: &Scope, name: &str) -> AccessResult<Job> {
        let (_, job) = self.load(scope, name).await?;
        Ok(job)
    }

    pub async fn get_by_name(&self, scope: &Scope, name: &str) -> AccessResult<Job> {
        self.get(scope, name).await
    }

    /// Insert a new job at version 0.
    #[instrument(level = "debug", skip(self, scope, job), fields(job = %job.id()))]
    pub async fn create(&self, scope: &Scope, mut job: Job) -> AccessResult<Job> {
        job.validate()?;
        job.version = 0;

        let document = to_document(&JobRecord::from(&job))?;
        scope
            .run(scope.store().insert_one(COLLECTION, document))
            .await?;
        Ok(job)
    }

    /// Replace the stored fields of `name` with `job`, bumping the version.
    #[instrument(level = "debug", skip(self, scope, job))]
    pub async fn update(&self, scope: &Scope, name: &str, mut job: Job) -> AccessResult<Job> {
        if job.name.as_str() != name {
            return Err(AccessError::Validation(format!(
                "cannot rename job '{name}' to '{}'",
                job.name
            )));
        }
        job.validate()?;

        let (current_doc, current) = self.load(scope, name).await?;
        job.version = current.version + 1;

        let next_doc = to_document(&JobRecord::from(&job))?;
        let guard = Filter::and([by_name(name), version_guard(current.version)]);
        self.write(scope, &guard, &replacement(&current_doc, next_doc), name)
            .await?;
        Ok(job)
    }

    #[instrument(level = "debug", skip(self, scope))]
    pub async fn delete(&self, scope: &Scope, name: &str) -> AccessResult<()> {
        self.load(scope, name).await?;
        let deleted = scope
            .run(scope.store().delete_one(COLLECTION, &by_name(name)))
            .await?;
        if deleted == 0 {
            return Err(AccessError::not_found(COLLECTION, name));
        }
        Ok(())
    }

    pub async fn count(&self, scope: &Scope) -> AccessResult<u64> {
        scope
            .run(scope.store().count(COLLECTION, &Filter::All))
            .await
    }

    pub async fn query(&self, scope: &Scope, page: Pagination) -> AccessResult<Vec<Job>> {
        let documents = scope
            .run(
                scope
                    .store()
                    .find(COLLECTION, &Filter::All, page.find_options()),
            )
            .await?;
        documents.into_iter().map(decode).collect()
    }

    /// Claim any eligible job, using the wall clock.
    pub async fn claim(&self, scope: &Scope) -> AccessResult<Job> {
        self.claim_at(scope, Utc::now()).await
    }

    /// Claim any job eligible at `now`.
    #[instrument(level = "debug", skip(self, scope))]
    pub async fn claim_at(&self, scope: &Scope, now: DateTime<Utc>) -> AccessResult<Job> {
        let eligible = self.lease.eligibility_filter(now);
        let candidate = scope
            .run(scope.store().find_one(COLLECTION, &eligible))
            .await?
            .ok_or(AccessError::NoEligibleJob)?;

        let candidate = decode(candidate)?;
        let claimed = self.lease.claim(&candidate, now)?;
        let Some(expiration) = claimed.state.expiration() else {
            return Err(AccessError::Corrupt(format!(
                "claimed job '{}' has no expiration",
                claimed.name
            )));
        };

        let guard = Filter::and([
            by_name(candidate.name.as_str()),
            version_guard(candidate.version),
            eligible,
        ]);
        let update = Update::new()
            .set(fields::STATE, StateTag::InProgress.as_str())
            .set(fields::EXPIRATION, expiration.timestamp_millis())
            .set(fields::VERSION, claimed.version);

        let outcome = scope
            .run(scope.store().update_one(COLLECTION, &guard, &update))
            .await?;
        if outcome.matched == 0 {
            debug!(job = %candidate.name, "lost claim race");
            return Err(AccessError::Conflict(format!(
                "job '{}' was claimed concurrently",
                candidate.name
            )));
        }

        debug!(job = %claimed.name, %expiration, version = claimed.version, "claimed job");
        Ok(claimed)
    }

    /// Return a job this caller claimed to idle.
    ///
    /// `claimed` is the record [`claim`](Self::claim) handed out. The write is
    /// guarded on its version, so a worker whose lease lapsed and was taken
    /// over gets `Conflict` instead of releasing the new holder. A job that is
    /// already idle is left untouched.
    #[instrument(level = "debug", skip(self, scope, claimed), fields(job = %claimed.name, version = claimed.version))]
    pub async fn release(&self, scope: &Scope, claimed: &Job) -> AccessResult<Job> {
        let name = claimed.name.as_str();
        let (_, current) = self.load(scope, name).await?;
        if current.state.is_idle() {
            return Ok(current);
        }
        if current.version != claimed.version {
            debug!(job = %name, held = current.version, "release of a superseded lease");
            return Err(AccessError::Conflict(format!(
                "job '{name}' is held at version {}, not {}",
                current.version, claimed.version
            )));
        }

        let released = self.lease.release(&current);
        let guard = Filter::and([by_name(name), version_guard(claimed.version)]);
        let update = Update::new()
            .set(fields::STATE, StateTag::Idle.as_str())
            .unset(fields::EXPIRATION)
            .set(fields::VERSION, released.version);
        self.write(scope, &guard, &update, name).await?;

        debug!(job = %released.name, version = released.version, "released job");
        Ok(released)
    }

    async fn load(&self, scope: &Scope, name: &str) -> AccessResult<(Document, Job)> {
        let document = scope
            .run(scope.store().find_one(COLLECTION, &by_name(name)))
            .await?
            .ok_or_else(|| AccessError::not_found(COLLECTION, name))?;
        let job = decode(document.clone())?;
        Ok((document, job))
    }

    async fn write(
        &self,
        scope: &Scope,
        guard: &Filter,
        update: &Update,
        name: &str,
    ) -> AccessResult<()> {
        let outcome = scope
            .run(scope.store().update_one(COLLECTION, guard, update))
            .await?;
        if outcome.matched == 0 {
            return Err(AccessError::Conflict(format!(
                "job '{name}' changed concurrently"
            )));
        }
        Ok(())
    }
}

/// Claiming seam used by the retry loop.
#[async_trait]
pub trait ClaimJob: Send + Sync {
    async fn claim(&self, scope: &Scope) -> AccessResult<Job>;
}

#[async_trait]
impl ClaimJob for JobDao {
    async fn claim(&self, scope: &Scope) -> AccessResult<Job> {
        JobDao::claim(self, scope).await
    }
}

fn by_name(name: &str) -> Filter {
    Filter::eq(fields::NAME, name)
}

fn decode(document: Document) -> AccessResult<Job> {
    let record: JobRecord = from_document(document)?;
    Job::try_from(record).map_err(|e| {
        warn!(error = %e, "undecodable job record");
        AccessError::Corrupt(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::LeaseConfig;
    use chrono::TimeZone;
    use dataaccess_store::{DocumentStore, InMemoryDocumentStore};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    async fn setup() -> (Arc<InMemoryDocumentStore>, Scope, JobDao) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let scope = Scope::new(store.clone());
        let dao = JobDao::new(LeasePolicy::new(LeaseConfig::from_secs(60)).unwrap());
        dao.ensure_indexes(&scope).await.unwrap();
        (store, scope, dao)
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (_, scope, dao) = setup().await;
        let job = Job::new("build-1").unwrap().with_field("repository", "web");

        dao.create(&scope, job.clone()).await.unwrap();
        assert_eq!(dao.get(&scope, "build-1").await.unwrap(), job);
        assert_eq!(dao.get_by_name(&scope, "build-1").await.unwrap(), job);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let (_, scope, dao) = setup().await;
        dao.create(&scope, Job::new("build-1").unwrap()).await.unwrap();

        let err = dao
            .create(&scope, Job::new("build-1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_jobs_are_not_found() {
        let (_, scope, dao) = setup().await;

        assert!(matches!(
            dao.get(&scope, "ghost").await,
            Err(AccessError::NotFound { .. })
        ));
        assert!(matches!(
            dao.release(&scope, &Job::new("ghost").unwrap()).await,
            Err(AccessError::NotFound { .. })
        ));
        assert!(matches!(
            dao.delete(&scope, "ghost").await,
            Err(AccessError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_replaces_fields_and_bumps_version() {
        let (store, scope, dao) = setup().await;
        let job = Job::new("build-1").unwrap().with_field("priority", 1);
        dao.create(&scope, job).await.unwrap();

        let next = Job::new("build-1").unwrap().with_field("owner", "ci");
        let updated = dao.update(&scope, "build-1", next).await.unwrap();
        assert_eq!(updated.version, 1);

        let stored = store.snapshot("job").remove(0);
        assert!(stored.get("priority").is_none());
        assert_eq!(stored["owner"], json!("ci"));
        assert_eq!(stored["version"], json!(1));
    }

    #[tokio::test]
    async fn update_rejects_renames() {
        let (_, scope, dao) = setup().await;
        dao.create(&scope, Job::new("build-1").unwrap()).await.unwrap();

        let err = dao
            .update(&scope, "build-1", Job::new("build-2").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Validation(_)));
    }

    #[tokio::test]
    async fn reserved_payload_fields_never_reach_the_store() {
        let (store, scope, dao) = setup().await;
        let job = Job::new("build-1").unwrap().with_field("version", 9);

        assert!(matches!(
            dao.create(&scope, job).await,
            Err(AccessError::Validation(_))
        ));
        assert!(store.snapshot("job").is_empty());
    }

    #[tokio::test]
    async fn delete_removes_the_job() {
        let (_, scope, dao) = setup().await;
        dao.create(&scope, Job::new("build-1").unwrap()).await.unwrap();

        dao.delete(&scope, "build-1").await.unwrap();
        assert_eq!(dao.count(&scope).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_pages_in_insertion_order() {
        let (_, scope, dao) = setup().await;
        for i in 0..5 {
            dao.create(&scope, Job::new(format!("j{i}")).unwrap())
                .await
                .unwrap();
        }

        let page = dao.query(&scope, Pagination::new(1, 2)).await.unwrap();
        let names: Vec<_> = page.iter().map(|j| j.name.to_string()).collect();
        assert_eq!(names, ["j1", "j2"]);

        assert_eq!(dao.query(&scope, Pagination::all()).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn claim_writes_lease_fields() {
        let (store, scope, dao) = setup().await;
        dao.create(&scope, Job::new("build-1").unwrap()).await.unwrap();

        let claimed = dao.claim_at(&scope, t(1_000)).await.unwrap();
        assert_eq!(claimed.version, 1);
        assert!(!dao.lease().is_eligible(&claimed, t(61_000)));

        let stored = store.snapshot("job").remove(0);
        assert_eq!(stored["state"], json!("in_progress"));
        assert_eq!(stored["expiration"], json!(61_000));
        assert_eq!(stored["version"], json!(1));
    }

    #[tokio::test]
    async fn documents_without_state_or_version_are_claimable() {
        let (store, scope, dao) = setup().await;
        store
            .insert_one("job", doc(json!({ "name": "legacy", "repo": "web" })))
            .await
            .unwrap();

        let claimed = dao.claim_at(&scope, t(0)).await.unwrap();
        assert_eq!(claimed.name, "legacy");
        assert_eq!(claimed.payload["repo"], json!("web"));
    }

    #[tokio::test]
    async fn empty_collection_has_no_eligible_job() {
        let (_, scope, dao) = setup().await;
        assert_eq!(
            dao.claim_at(&scope, t(0)).await.unwrap_err(),
            AccessError::NoEligibleJob
        );
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let (store, scope, dao) = setup().await;
        dao.create(&scope, Job::new("build-1").unwrap()).await.unwrap();
        let claimed = dao.claim_at(&scope, t(0)).await.unwrap();

        let first = dao.release(&scope, &claimed).await.unwrap();
        let after_first = store.snapshot("job");
        let second = dao.release(&scope, &claimed).await.unwrap();

        assert!(first.state.is_idle());
        assert_eq!(first, second);
        assert_eq!(store.snapshot("job"), after_first);
        assert!(after_first[0].get("expiration").is_none());
    }

    #[tokio::test]
    async fn stale_release_conflicts() {
        let (store, scope, dao) = setup().await;
        dao.create(&scope, Job::new("build-1").unwrap()).await.unwrap();
        let claimed = dao.claim_at(&scope, t(0)).await.unwrap();

        // Another writer moves the version on while the lease is still held.
        store
            .update_one("job", &by_name("build-1"), &Update::new().inc("version", 1))
            .await
            .unwrap();

        let err = dao.release(&scope, &claimed).await.unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
        let stored = dao.get(&scope, "build-1").await.unwrap();
        assert!(stored.is_in_progress());
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn guarded_write_rejects_a_moved_version() {
        let (store, scope, dao) = setup().await;
        dao.create(&scope, Job::new("build-1").unwrap()).await.unwrap();
        let (_, observed) = dao.load(&scope, "build-1").await.unwrap();
        store
            .update_one("job", &by_name("build-1"), &Update::new().inc("version", 1))
            .await
            .unwrap();

        let guard = Filter::and([by_name("build-1"), version_guard(observed.version)]);
        let err = dao
            .write(&scope, &guard, &Update::new().set("state", "idle"), "build-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
    }

    #[tokio::test]
    async fn corrupt_state_is_reported() {
        let (store, scope, dao) = setup().await;
        store
            .insert_one("job", doc(json!({ "name": "odd", "state": "paused" })))
            .await
            .unwrap();

        assert!(matches!(
            dao.get(&scope, "odd").await,
            Err(AccessError::Corrupt(_))
        ));
    }
}
