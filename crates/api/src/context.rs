use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ledgerq_core::OrgId;
use ledgerq_jobs::{
    JobStore, QueueScheduler, SchedulerConfig, SchedulerHandle, SubmitQueue, SubmitWorker,
    WorkerConfig, WorkerHandle,
};
use ledgerq_ledger::{Gateway, GatewayRegistry, InMemoryContract, InMemoryNetwork};

use crate::config::Config;

/// Contract implementation the service runs against.
pub type Ledger = InMemoryContract;

/// Job store shared by the queue, worker pool and scheduler.
pub type SharedStore = Arc<dyn JobStore>;

/// Organisation a request is authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgContext {
    org_id: OrgId,
}

impl OrgContext {
    pub fn new(org_id: OrgId) -> Self {
        Self { org_id }
    }

    pub fn org_id(&self) -> &OrgId {
        &self.org_id
    }
}

/// Handles the HTTP layer needs for every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub queue: SubmitQueue<SharedStore>,
    pub gateways: Arc<GatewayRegistry<Ledger>>,
}

/// Gateways for both configured organisations over the simulated network.
pub fn simulated_gateways(config: &Config, network: &Arc<InMemoryNetwork>) -> GatewayRegistry<Ledger> {
    [&config.org1.msp_id, &config.org2.msp_id]
        .into_iter()
        .fold(GatewayRegistry::new(), |registry, org| {
            registry.with(Gateway::new(
                org.clone(),
                Arc::new(network.contract(org.clone())),
                config.gateway,
            ))
        })
}

/// Owns the queue, worker pool and scheduler for the life of the process.
pub struct AppContext {
    state: AppState,
    worker: WorkerHandle,
    scheduler: Option<SchedulerHandle>,
    shutdown: CancellationToken,
}

impl AppContext {
    /// Start the worker pool, and the scheduler when enabled.
    pub fn start(config: Config, store: SharedStore, gateways: GatewayRegistry<Ledger>) -> Self {
        let shutdown = CancellationToken::new();
        let gateways = Arc::new(gateways);
        let queue = SubmitQueue::new(Arc::clone(&store), config.job_options);

        let worker = SubmitWorker::new(
            Arc::clone(&store),
            Arc::clone(&gateways),
            WorkerConfig::default().with_concurrency(config.concurrency),
        )
        .spawn(shutdown.child_token());

        let scheduler = config.queue_scheduler.then(|| {
            QueueScheduler::new(Arc::clone(&store), SchedulerConfig::default())
                .spawn(shutdown.child_token())
        });

        Self {
            state: AppState {
                config: Arc::new(config),
                queue,
                gateways,
            },
            worker,
            scheduler,
            shutdown,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the scheduler, drain the worker pool, then close the queue.
    pub async fn shutdown(self) {
        if let Some(scheduler) = self.scheduler {
            scheduler.shutdown().await;
        }

        let stats = self.worker.shutdown().await;
        info!(
            processed = stats.jobs_processed,
            completed = stats.jobs_completed,
            failed = stats.jobs_failed,
            "submit worker drained"
        );

        if let Err(e) = self.state.queue.close().await {
            error!(error = %e, "failed to close submit queue");
        }
        self.shutdown.cancel();
    }
}

/// Resolves on Ctrl-C, SIGTERM or cancellation of `token`, whichever comes
/// first.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate() => info!("received SIGTERM"),
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "failed to listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
