use std::sync::Arc;

use anyhow::Context;
use dataaccess_access::{JobDao, LeasePolicy, RepositoryDao, Scope};
use dataaccess_core::Job;
use dataaccess_worker::worker::HandlerError;
use dataaccess_worker::{WorkerStats, run_worker};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Step 1: Load configuration and start logging.
    let settings = dataaccess_worker::config::load().context("load configuration")?;
    dataaccess_observability::init_with(settings.log.format);

    // Step 2: Open the store and declare indexes.
    let store = dataaccess_worker::store::connect(&settings.store).await.context("open store")?;
    let mut scope = Scope::new(store);
    if let Some(timeout) = settings.worker.operation_timeout() {
        scope = scope.with_timeout(timeout);
    }

    let lease = LeasePolicy::new(settings.lease).context("build lease policy")?;
    let dao = Arc::new(JobDao::new(lease));
    dao.ensure_indexes(&scope).await.context("ensure job indexes")?;
    RepositoryDao::new()
        .ensure_indexes(&scope)
        .await
        .context("ensure repository indexes")?;

    // Step 3: Stop on Ctrl-C.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl-C, shutting down");
            }
            shutdown.cancel();
        });
    }

    // Step 4: Run the workers.
    info!(
        concurrency = settings.worker.concurrency,
        lease_secs = settings.lease.lease_duration_secs,
        "starting workers"
    );
    let handler = Arc::new(|job: Job| async move {
        info!(job = %job.name, "processing job");
        Ok::<(), HandlerError>(())
    });

    let mut workers = Vec::with_capacity(settings.worker.concurrency);
    for index in 0..settings.worker.concurrency {
        let (dao, scope, handler, shutdown) =
            (dao.clone(), scope.clone(), handler.clone(), shutdown.clone());
        let worker_settings = settings.worker.clone();
        workers.push(tokio::spawn(async move {
            let name = format!("worker-{index}");
            run_worker(&name, &dao, &scope, &worker_settings, handler.as_ref(), shutdown).await
        }));
    }

    let mut total = WorkerStats::default();
    for worker in workers {
        total += worker.await.context("join worker")?;
    }
    info!(?total, "all workers stopped");
    Ok(())
}
