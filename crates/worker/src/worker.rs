//! Claim → process → release loop.

use std::error::Error as StdError;
use std::future::Future;
use std::ops::AddAssign;

use async_trait::async_trait;
use dataaccess_access::{AccessError, JobDao, Scope, claim_with_retry};
use dataaccess_core::Job;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkerSettings;

pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Work done on a claimed job.
///
/// Runs while the worker holds the lease. The job is released afterwards
/// whether or not the handler succeeded.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, job: &Job) -> Result<(), HandlerError> {
        (self)(job.clone()).await
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub claimed: u64,
    pub released: u64,
    /// Releases rejected because the record changed underneath us.
    pub conflicts: u64,
    /// Handler failures plus store errors.
    pub errors: u64,
}

impl AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.claimed += other.claimed;
        self.released += other.released;
        self.conflicts += other.conflicts;
        self.errors += other.errors;
    }
}

/// Run one worker until `shutdown` fires.
///
/// Claims are cancelled on shutdown; a job already claimed is still processed
/// and released through the uncancelled `scope`.
pub async fn run_worker<H>(
    name: &str,
    dao: &JobDao,
    scope: &Scope,
    settings: &WorkerSettings,
    handler: &H,
    shutdown: CancellationToken,
) -> WorkerStats
where
    H: JobHandler + ?Sized,
{
    let claim_scope = scope.clone().with_cancellation(shutdown.clone());
    let retry = settings.retry_policy();
    let mut stats = WorkerStats::default();

    info!(worker = name, "worker started");

    while !shutdown.is_cancelled() {
        let pause = match claim_with_retry(dao, &claim_scope, &retry).await {
            Ok(job) => {
                stats.claimed += 1;
                process(name, dao, scope, handler, job, &mut stats).await;
                continue;
            }
            Err(AccessError::NoEligibleJob) => {
                debug!(worker = name, "no eligible job");
                settings.poll_interval()
            }
            Err(AccessError::Cancelled) => break,
            Err(err) => {
                stats.errors += 1;
                warn!(worker = name, error = %err, "claim failed");
                settings.poll_interval()
            }
        };

        if claim_scope.sleep(pause).await.is_err() {
            break;
        }
    }

    info!(worker = name, ?stats, "worker stopped");
    stats
}

async fn process<H>(
    name: &str,
    dao: &JobDao,
    scope: &Scope,
    handler: &H,
    job: Job,
    stats: &mut WorkerStats,
) where
    H: JobHandler + ?Sized,
{
    debug!(worker = name, job = %job.name, "processing job");
    if let Err(err) = handler.handle(&job).await {
        stats.errors += 1;
        warn!(worker = name, job = %job.name, error = %err, "job handler failed");
    }

    match dao.release(scope, &job).await {
        Ok(_) => stats.released += 1,
        Err(AccessError::Conflict(reason)) => {
            stats.conflicts += 1;
            warn!(worker = name, job = %job.name, %reason, "release conflicted");
        }
        Err(err) => {
            stats.errors += 1;
            warn!(worker = name, job = %job.name, error = %err, "release failed; lease will expire");
        }
    }
}
