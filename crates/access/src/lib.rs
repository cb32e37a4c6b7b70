//! `dataaccess-access`: record stores over a [`DocumentStore`](dataaccess_store::DocumentStore).
//!
//! - [`JobDao`]: job CRUD plus the lease protocol (`claim` / `release`).
//! - [`RepositoryDao`]: repository CRUD plus dependency and name-set lookups.
//! - [`LeasePolicy`]: eligibility rules and lease transitions.
//! - [`Scope`]: the store handle, deadline and cancellation for one caller.
//!
//! Every operation takes an explicit `&Scope`; there is no global store.

pub mod error;
pub mod jobs;
pub mod lease;
pub mod pagination;
mod record;
pub mod repositories;
pub mod retry;
pub mod scope;

pub use error::{AccessError, AccessResult};
pub use jobs::{ClaimJob, JobDao};
pub use lease::{LeaseConfig, LeasePolicy};
pub use pagination::Pagination;
pub use repositories::RepositoryDao;
pub use retry::{BackoffStrategy, ClaimRetryPolicy, claim_with_retry};
pub use scope::Scope;
