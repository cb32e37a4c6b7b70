//! Repository record store.

use dataaccess_core::{Entity, Repository};
use dataaccess_store::{Document, Filter, FindOptions};
use tracing::instrument;

use crate::error::{AccessError, AccessResult};
use crate::pagination::Pagination;
use crate::record::{from_document, replacement, to_document};
use crate::scope::Scope;

const COLLECTION: &str = Repository::COLLECTION;
const NAME: &str = "name";
const DEPENDENCY_NAME: &str = "dependencies.name";

#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryDao;

impl RepositoryDao {
    pub fn new() -> Self {
        Self
    }

    pub async fn ensure_indexes(&self, scope: &Scope) -> AccessResult<()> {
        scope
            .run(scope.store().ensure_unique_index(COLLECTION, NAME))
            .await
    }

    #[instrument(level = "debug", skip(self, scope))]
    pub async fn get(&self, scope: &Scope, name: &str) -> AccessResult<Repository> {
        let (_, repository) = self.load(scope, name).await?;
        Ok(repository)
    }

    #[instrument(level = "debug", skip(self, scope, repository), fields(repository = %repository.id()))]
    pub async fn create(&self, scope: &Scope, repository: Repository) -> AccessResult<Repository> {
        repository.validate()?;
        let document = to_document(&repository)?;
        scope
            .run(scope.store().insert_one(COLLECTION, document))
            .await?;
        Ok(repository)
    }

    #[instrument(level = "debug", skip(self, scope, repository))]
    pub async fn update(
        &self,
        scope: &Scope,
        name: &str,
        repository: Repository,
    ) -> AccessResult<Repository> {
        if repository.name.as_str() != name {
            return Err(AccessError::Validation(format!(
                "cannot rename repository '{name}' to '{}'",
                repository.name
            )));
        }
        repository.validate()?;

        let (current, _) = self.load(scope, name).await?;
        let update = replacement(&current, to_document(&repository)?);
        let outcome = scope
            .run(scope.store().update_one(COLLECTION, &by_name(name), &update))
            .await?;
        if outcome.matched == 0 {
            return Err(AccessError::not_found(COLLECTION, name));
        }
        Ok(repository)
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

    pub async fn query(&self, scope: &Scope, page: Pagination) -> AccessResult<Vec<Repository>> {
        self.find(scope, &Filter::All, page.find_options()).await
    }

    /// Repositories that list `dependency` among their dependencies.
    #[instrument(level = "debug", skip(self, scope))]
    pub async fn query_by_dependency(
        &self,
        scope: &Scope,
        dependency: &str,
    ) -> AccessResult<Vec<Repository>> {
        let filter = Filter::eq(DEPENDENCY_NAME, dependency);
        self.find(scope, &filter, FindOptions::default()).await
    }

    /// Repositories whose name is one of `names`.
    pub async fn query_by_name<I, S>(&self, scope: &Scope, names: I) -> AccessResult<Vec<Repository>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::is_in(NAME, names);
        self.find(scope, &filter, FindOptions::default()).await
    }

    async fn find(
        &self,
        scope: &Scope,
        filter: &Filter,
        options: FindOptions,
    ) -> AccessResult<Vec<Repository>> {
        let documents = scope
            .run(scope.store().find(COLLECTION, filter, options))
            .await?;
        documents.into_iter().map(from_document).collect()
    }

    async fn load(&self, scope: &Scope, name: &str) -> AccessResult<(Document, Repository)> {
        let document = scope
            .run(scope.store().find_one(COLLECTION, &by_name(name)))
            .await?
            .ok_or_else(|| AccessError::not_found(COLLECTION, name))?;
        let repository = from_document(document.clone())?;
        Ok((document, repository))
    }
}

fn by_name(name: &str) -> Filter {
    Filter::eq(NAME, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataaccess_core::Dependency;
    use dataaccess_store::InMemoryDocumentStore;
    use std::sync::Arc;

    async fn seeded() -> (Scope, RepositoryDao) {
        let scope = Scope::new(Arc::new(InMemoryDocumentStore::new()));
        let dao = RepositoryDao::new();
        dao.ensure_indexes(&scope).await.unwrap();

        let core = Repository::new("core").unwrap();
        let ui = Repository::new("ui")
            .unwrap()
            .with_dependency(Dependency::new("core").with_version("^1"));
        let web = Repository::new("web")
            .unwrap()
            .with_dependency(Dependency::new("core"))
            .with_dependency(Dependency::new("ui"))
            .with_metadata("url", "https://example.invalid/web.git");
        for repo in [core, ui, web] {
            dao.create(&scope, repo).await.unwrap();
        }
        (scope, dao)
    }

    fn names(repos: &[Repository]) -> Vec<&str> {
        repos.iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let (scope, dao) = seeded().await;

        let web = dao.get(&scope, "web").await.unwrap();
        assert!(web.depends_on("ui"));
        assert_eq!(dao.count(&scope).await.unwrap(), 3);

        let trimmed = Repository::new("web")
            .unwrap()
            .with_dependency(Dependency::new("core"));
        dao.update(&scope, "web", trimmed.clone()).await.unwrap();
        assert_eq!(dao.get(&scope, "web").await.unwrap(), trimmed);

        dao.delete(&scope, "web").await.unwrap();
        assert!(matches!(
            dao.get(&scope, "web").await,
            Err(AccessError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let (scope, dao) = seeded().await;
        let err = dao
            .create(&scope, Repository::new("core").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Conflict(_)));
    }

    #[tokio::test]
    async fn query_by_dependency_matches_any_element() {
        let (scope, dao) = seeded().await;

        let dependents = dao.query_by_dependency(&scope, "core").await.unwrap();
        assert_eq!(names(&dependents), ["ui", "web"]);

        let dependents = dao.query_by_dependency(&scope, "ui").await.unwrap();
        assert_eq!(names(&dependents), ["web"]);

        assert!(dao.query_by_dependency(&scope, "db").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_by_name_selects_the_set() {
        let (scope, dao) = seeded().await;

        let found = dao.query_by_name(&scope, ["web", "core", "ghost"]).await.unwrap();
        assert_eq!(names(&found), ["core", "web"]);
    }

    #[tokio::test]
    async fn empty_name_set_skips_the_store() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.set_available(false);
        let scope = Scope::new(store);

        let found = RepositoryDao::new()
            .query_by_name(&scope, Vec::<String>::new())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn query_pages() {
        let (scope, dao) = seeded().await;
        let page = dao.query(&scope, Pagination::new(1, 1)).await.unwrap();
        assert_eq!(names(&page), ["ui"]);
    }
}
