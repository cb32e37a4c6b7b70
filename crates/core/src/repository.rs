//! Repository model.
//!
//! Repositories carry no lease semantics; they are plain records keyed by name
//! with a list of the repositories they depend on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::name::RepositoryName;

/// Edge to another repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// A repository record. Serialises directly to its document shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: RepositoryName,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Remaining top-level fields, kept verbatim.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Repository {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        Ok(Self {
            name: RepositoryName::new(name)?,
            dependencies: Vec::new(),
            metadata: Map::new(),
        })
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.name == name)
    }

    pub fn validate(&self) -> DomainResult<()> {
        if let Some(dep) = self.dependencies.iter().find(|d| d.name.trim().is_empty()) {
            return Err(DomainError::validation(format!(
                "repository '{}' has a dependency with an empty name ({dep:?})",
                self.name
            )));
        }
        if self.depends_on(self.name.as_str()) {
            return Err(DomainError::validation(format!(
                "repository '{}' depends on itself",
                self.name
            )));
        }
        for key in ["name", "dependencies"] {
            if self.metadata.contains_key(key) {
                return Err(DomainError::validation(format!(
                    "metadata field '{key}' collides with a reserved repository field"
                )));
            }
        }
        Ok(())
    }
}

impl Entity for Repository {
    type Id = RepositoryName;
    const COLLECTION: &'static str = "repository";

    fn id(&self) -> &Self::Id {
        &self.name
    }
}
