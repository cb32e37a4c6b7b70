//! Data-access error model.

use dataaccess_core::DomainError;
use dataaccess_store::StoreError;
use thiserror::Error;

pub type AccessResult<T> = Result<T, AccessError>;

/// Errors surfaced by the record stores.
///
/// `NoEligibleJob` is an ordinary outcome of `claim`, not a failure; callers
/// poll again later. `Timeout` and `Cancelled` come from the caller's
/// [`Scope`](crate::Scope), never from the store itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("{collection} '{name}' not found")]
    NotFound {
        collection: &'static str,
        name: String,
    },

    #[error("no eligible job")]
    NoEligibleJob,

    /// Lost claim race, stale write or duplicate name.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    /// A stored document could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl AccessError {
    pub fn not_found(collection: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            name: name.into(),
        }
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => AccessError::StoreUnavailable(msg),
            StoreError::DuplicateKey {
                collection,
                field,
                value,
            } => AccessError::Conflict(format!(
                "{collection} with {field} {value} already exists"
            )),
            StoreError::InvalidOperation(msg) => AccessError::Validation(msg),
        }
    }
}

impl From<DomainError> for AccessError {
    fn from(err: DomainError) -> Self {
        AccessError::Validation(err.to_string())
    }
}
