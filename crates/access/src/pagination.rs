use dataaccess_store::FindOptions;
use serde::{Deserialize, Serialize};

/// Offset/limit window for listing queries.
///
/// Results come back in the store's natural order. A `limit` of 0 means no
/// limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Number of records to skip (0-based).
    pub offset: u64,
    /// Maximum number of records to return; 0 = unbounded.
    pub limit: u64,
}

impl Pagination {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Everything, from the start.
    pub fn all() -> Self {
        Self::default()
    }

    pub(crate) fn find_options(&self) -> FindOptions {
        FindOptions::page(self.offset, (self.limit > 0).then_some(self.limit))
    }
}
