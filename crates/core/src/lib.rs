//! `dataaccess-core`: domain model for the data-access layer.
//!
//! This crate contains **pure domain** types (no infrastructure concerns): the
//! job and repository records, the closed job lease state, name validation and
//! the domain error model. Conversion to and from stored documents happens at
//! the boundary through the `*Record` wire types.

pub mod entity;
pub mod error;
pub mod job;
pub mod name;
pub mod repository;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use job::{Job, JobRecord, JobState, StateTag};
pub use name::{JobName, RepositoryName};
pub use repository::{Dependency, Repository};
