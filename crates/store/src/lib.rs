//! Document store boundary.
//!
//! This crate defines the document-oriented persistence interface the
//! data-access layer is written against, without making storage assumptions:
//!
//! - [`Document`]: a JSON object keyed by field name.
//! - [`Filter`]: a predicate tree over dotted field paths.
//! - [`Update`]: `$set` / `$unset` / `$inc` style modifications.
//! - [`DocumentStore`]: async find/insert/update/delete/count over named
//!   collections, with per-document atomic updates that report a match count.
//!
//! Implementations: [`InMemoryDocumentStore`] (tests/dev) and, behind the
//! `mongodb` feature, `MongoDocumentStore`.

pub mod document;
pub mod filter;
pub mod in_memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod r#trait;
pub mod update;

pub use document::Document;
pub use filter::Filter;
pub use in_memory::InMemoryDocumentStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoDocumentStore;
pub use r#trait::{DocumentStore, FindOptions, StoreError, UpdateOutcome};
pub use update::Update;
