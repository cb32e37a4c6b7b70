//! Store selection.

use std::sync::Arc;

use dataaccess_store::{DocumentStore, InMemoryDocumentStore};
use tracing::info;

use crate::config::{StoreBackend, StoreSettings};
use crate::error::WorkerError;

/// Open the backend named in `settings`.
pub async fn connect(settings: &StoreSettings) -> Result<Arc<dyn DocumentStore>, WorkerError> {
    match settings.backend {
        StoreBackend::Memory => {
            info!("using in-memory document store");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
        StoreBackend::Mongodb => connect_mongodb(settings).await,
    }
}

#[cfg(feature = "mongodb")]
async fn connect_mongodb(settings: &StoreSettings) -> Result<Arc<dyn DocumentStore>, WorkerError> {
    let store =
        dataaccess_store::MongoDocumentStore::connect(&settings.uri, &settings.database).await?;
    info!(database = %settings.database, "using mongodb document store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "mongodb"))]
async fn connect_mongodb(_settings: &StoreSettings) -> Result<Arc<dyn DocumentStore>, WorkerError> {
    Err(WorkerError::Unsupported(
        "store.backend = \"mongodb\" requires the `mongodb` feature".to_string(),
    ))
}
