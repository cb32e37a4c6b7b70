//! Per-request execution scope.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dataaccess_store::{DocumentStore, StoreError};
use tokio_util::sync::CancellationToken;

use crate::error::{AccessError, AccessResult};

/// Handle threaded through every data-access call.
///
/// Carries the store to talk to plus the caller's deadline and cancellation
/// signal. There is no global store; two scopes over different stores are
/// fully independent. Cloning is cheap.
#[derive(Clone)]
pub struct Scope {
    store: Arc<dyn DocumentStore>,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl Scope {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            timeout: None,
            cancellation: None,
        }
    }

    /// Fail any single store call that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort in-flight calls once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Drive a store call under this scope's deadline and cancellation.
    pub async fn run<T, F>(&self, call: F) -> AccessResult<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result.map_err(AccessError::from),
                    Err(_) => Err(AccessError::Timeout),
                },
                None => call.await.map_err(AccessError::from),
            }
        };

        match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(AccessError::Cancelled),
                result = bounded => result,
            },
            None => bounded.await,
        }
    }

    /// Sleep for `duration`, waking early with `Cancelled` if the scope is
    /// cancelled.
    pub async fn sleep(&self, duration: Duration) -> AccessResult<()> {
        match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(AccessError::Cancelled),
                _ = tokio::time::sleep(duration) => Ok(()),
            },
            None => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("timeout", &self.timeout)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}
