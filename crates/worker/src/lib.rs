//! `dataaccess-worker`: runs job workers against the configured store.
//!
//! - [`config`]: layered settings (files + `DATAACCESS__*` env).
//! - [`store`]: backend selection.
//! - [`worker`]: the claim → process → release loop.

pub mod config;
pub mod error;
pub mod store;
pub mod worker;

pub use self::config::{Settings, StoreBackend, WorkerSettings};
pub use error::WorkerError;
pub use worker::{HandlerError, JobHandler, WorkerStats, run_worker};
