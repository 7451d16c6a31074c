//! Submission worker pool.
//!
//! Each claimed job runs on its own task under a per-claim lease token. The
//! lease is heartbeated while the ledger call is in flight; a worker that
//! loses its lease can no longer commit anything for that job.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ledgerq_ledger::{Contract, GatewayRegistry, RetryAction, Transaction, classify};

use super::store::{JobStore, JobStoreError};
use super::types::{AttemptResult, JobId, JobOutcome, JobState, SubmitJob};

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum jobs processed at once
    pub concurrency: usize,
    /// How long to sleep when the queue is empty
    pub poll_interval: Duration,
    /// Lease granted per claim; renewed at half this interval
    pub lease_duration: Duration,
    /// Name for logging and lease tokens
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(100),
            lease_duration: Duration::from_secs(30),
            name: "submit-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// How often a held lease is renewed. Never zero.
    pub fn heartbeat_period(&self) -> Duration {
        (self.lease_duration / 2).max(Duration::from_millis(1))
    }
}

/// Failure to run or commit an attempt; the job itself is left to the
/// stall sweep.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

#[derive(Debug)]
struct Counters {
    started: Instant,
    processed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    running: AtomicUsize,
}

impl Counters {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            processed: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            running: AtomicUsize::new(0),
        }
    }

    fn record(&self, state: JobState) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = match state {
            JobState::Completed => &self.completed,
            JobState::Failed => &self.failed,
            _ => &self.retried,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            jobs_processed: self.processed.load(Ordering::Relaxed),
            jobs_completed: self.completed.load(Ordering::Relaxed),
            jobs_failed: self.failed.load(Ordering::Relaxed),
            jobs_retried: self.retried.load(Ordering::Relaxed),
            current_running: self.running.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

/// Handle to control a running worker pool.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl WorkerHandle {
    /// Stop claiming jobs and wait for in-flight ones to finish.
    pub async fn shutdown(self) -> WorkerStats {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            error!(error = %e, "submit worker task failed");
        }
        self.counters.snapshot()
    }

    pub fn stats(&self) -> WorkerStats {
        self.counters.snapshot()
    }
}

/// Processes submission jobs against the organization's gateway.
pub struct SubmitWorker<S, C> {
    store: S,
    gateways: Arc<GatewayRegistry<C>>,
    config: WorkerConfig,
    counters: Arc<Counters>,
}

impl<S, C> SubmitWorker<S, C>
where
    S: JobStore + Clone + 'static,
    C: Contract,
{
    pub fn new(store: S, gateways: Arc<GatewayRegistry<C>>, config: WorkerConfig) -> Self {
        Self {
            store,
            gateways,
            config,
            counters: Arc::new(Counters::new()),
        }
    }

    /// Run one attempt of `job`.
    ///
    /// A newly minted transaction identity is persisted before the submit;
    /// a discarded one is cleared before returning, so a crash between
    /// attempts never loses or reuses the wrong id.
    pub async fn process_job(
        &self,
        job: &mut SubmitJob,
        lease_owner: &str,
    ) -> Result<AttemptResult, SubmitError> {
        let Some(gateway) = self.gateways.get(&job.data.org_id) else {
            error!(job_id = %job.id, org_id = %job.data.org_id, "contract binding not found");
            return Ok(AttemptResult::Failed(JobOutcome::empty()));
        };

        let tx = match job.data.transaction_state.as_deref().filter(|s| !s.is_empty()) {
            Some(state) => match gateway.deserialize_transaction(state) {
                Ok(tx) => {
                    debug!(job_id = %job.id, transaction_id = %tx.transaction_id(), "reusing existing transaction");
                    tx
                }
                Err(err) => {
                    // The old id may already be ordered; minting a new one is unsafe.
                    error!(job_id = %job.id, error = %err, "unreadable transaction state");
                    return Ok(AttemptResult::Failed(JobOutcome::error(format!(
                        "unreadable transaction state: {err}"
                    ))));
                }
            },
            None => {
                let tx = gateway.create_transaction(&job.data.transaction_name);
                let state = match tx.serialize() {
                    Ok(state) => state,
                    Err(err) => {
                        warn!(job_id = %job.id, error = %err, "failed to serialize transaction");
                        return Ok(AttemptResult::Retry {
                            error: err.to_string(),
                        });
                    }
                };
                debug!(job_id = %job.id, transaction_id = %tx.transaction_id(), "using new transaction");
                job.data = job
                    .data
                    .clone()
                    .with_transaction(tx.transaction_id().clone(), state);
                self.store.update(job, lease_owner).await?;
                tx
            }
        };

        debug!(
            job_id = %job.id,
            transaction = %job.data.transaction_name,
            transaction_id = %tx.transaction_id(),
            "submitting transaction"
        );

        let err = match gateway.submit(&tx, &job.data.transaction_args).await {
            Ok(payload) => return Ok(AttemptResult::Completed(JobOutcome::payload(payload))),
            Err(err) => err,
        };

        match classify(&err) {
            RetryAction::NoRetry => {
                error!(job_id = %job.id, transaction_id = %tx.transaction_id(), error = %err, "fatal transaction error occurred");
                Ok(AttemptResult::Failed(JobOutcome::error(err.to_string())))
            }
            RetryAction::NewTransactionId => {
                warn!(job_id = %job.id, transaction_id = %tx.transaction_id(), error = %err, "retryable transaction error occurred, clearing transaction state");
                job.data = job.data.clone().without_transaction_state();
                self.store.update(job, lease_owner).await?;
                Ok(AttemptResult::Retry {
                    error: err.to_string(),
                })
            }
            RetryAction::SameTransactionId => {
                warn!(job_id = %job.id, transaction_id = %tx.transaction_id(), error = %err, "retryable transaction error occurred, keeping transaction state");
                Ok(AttemptResult::Retry {
                    error: err.to_string(),
                })
            }
        }
    }

    /// Process an attempt and commit its result, returning the stored record.
    pub async fn execute(&self, mut job: SubmitJob, lease_owner: &str) -> Result<SubmitJob, SubmitError> {
        let attempt = self.process_job(&mut job, lease_owner).await?;
        let finished = job.apply_attempt(attempt, Utc::now());
        self.store.update(&finished, lease_owner).await?;
        self.counters.record(finished.state);

        match finished.state {
            JobState::Completed => debug!(job_id = %finished.id, "job completed"),
            JobState::Failed => warn!(
                job_id = %finished.id,
                attempts = finished.attempts_made,
                reason = finished.failed_reason.as_deref().unwrap_or_default(),
                "job failed"
            ),
            state => debug!(job_id = %finished.id, state = state.as_str(), "job scheduled for retry"),
        }

        Ok(finished)
    }

    /// Spawn the pool on the current runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> WorkerHandle {
        let counters = Arc::clone(&self.counters);
        let token = shutdown.clone();
        let join = tokio::spawn(Arc::new(self).run(token));

        WorkerHandle {
            shutdown,
            join,
            counters,
        }
    }

    fn lease_token(&self) -> String {
        format!("{}:{}", self.config.name, Uuid::now_v7().simple())
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(worker = %self.config.name, concurrency = self.config.concurrency, "submit worker started");
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            while tasks.try_join_next().is_some() {}

            let owner = self.lease_token();
            match self.store.claim_next(&owner, self.config.lease_duration).await {
                Ok(Some(job)) => {
                    debug!(worker = %self.config.name, job_id = %job.id, "claimed job");
                    let worker = Arc::clone(&self);
                    tasks.spawn(async move {
                        worker.handle(job, owner).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    if self.idle(&shutdown).await {
                        break;
                    }
                }
                Err(JobStoreError::Closed) => break,
                Err(e) => {
                    error!(worker = %self.config.name, error = %e, "failed to claim job");
                    drop(permit);
                    if self.idle(&shutdown).await {
                        break;
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        info!(worker = %self.config.name, "submit worker stopped");
    }

    /// Sleep one poll interval; true when shutdown was requested.
    async fn idle(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => true,
            _ = tokio::time::sleep(self.config.poll_interval) => false,
        }
    }

    async fn handle(&self, job: SubmitJob, owner: String) {
        let job_id = job.id;
        self.counters.running.fetch_add(1, Ordering::Relaxed);
        let heartbeat = self.heartbeat(job_id, owner.clone());

        let result = self.execute(job, &owner).await;

        heartbeat.abort();
        self.counters.running.fetch_sub(1, Ordering::Relaxed);

        match result {
            Ok(_) => {}
            Err(SubmitError::Store(JobStoreError::LeaseLost(_))) => {
                warn!(job_id = %job_id, "lease lost while processing job");
            }
            Err(e) => error!(job_id = %job_id, error = %e, "failed to record job attempt"),
        }
    }

    fn heartbeat(&self, id: JobId, owner: String) -> JoinHandle<()> {
        let store = self.store.clone();
        let lease = self.config.lease_duration;
        let period = self.config.heartbeat_period();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = store.extend_lease(id, &owner, lease).await {
                    warn!(job_id = %id, error = %e, "failed to extend lease");
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use ledgerq_core::OrgId;
    use ledgerq_ledger::{Gateway, GatewayOptions, InMemoryContract, InMemoryNetwork, LedgerError, SubmitFault};

    use super::*;
    use crate::store::InMemoryJobStore;
    use crate::types::{Backoff, BackoffType, JobOptions, SubmitJobData};

    const LEASE: Duration = Duration::from_secs(30);

    #[test]
    fn heartbeat_period_is_half_the_lease_and_never_zero() {
        assert_eq!(WorkerConfig::default().heartbeat_period(), Duration::from_secs(15));
        let config = WorkerConfig::default().with_lease_duration(Duration::ZERO);
        assert_eq!(config.heartbeat_period(), Duration::from_millis(1));
    }

    fn org1() -> OrgId {
        OrgId::new("Org1MSP")
    }

    fn setup() -> (
        Arc<InMemoryNetwork>,
        Arc<InMemoryJobStore>,
        SubmitWorker<Arc<InMemoryJobStore>, InMemoryContract>,
    ) {
        let network = InMemoryNetwork::arc();
        let gateways = GatewayRegistry::new().with(Gateway::new(
            org1(),
            Arc::new(network.contract(org1())),
            GatewayOptions::default(),
        ));
        let store = InMemoryJobStore::arc(Default::default());
        let worker = SubmitWorker::new(store.clone(), Arc::new(gateways), WorkerConfig::default());
        (network, store, worker)
    }

    async fn claim(store: &Arc<InMemoryJobStore>, org: OrgId, name: &str, args: &[&str]) -> SubmitJob {
        let opts = JobOptions {
            attempts: 3,
            backoff: Backoff {
                kind: BackoffType::Fixed,
                delay: Duration::ZERO,
            },
        };
        let args = args.iter().map(|a| a.to_string()).collect();
        store
            .enqueue(SubmitJob::new(SubmitJobData::new(org, name, args), opts))
            .await
            .unwrap();
        store.claim_next("w1", LEASE).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn missing_binding_fails_with_empty_outcome() {
        let (network, store, worker) = setup();
        let mut job = claim(&store, OrgId::new("Org9MSP"), "InitLedger", &[]).await;

        let result = worker.process_job(&mut job, "w1").await.unwrap();

        assert_eq!(result, AttemptResult::Failed(JobOutcome::empty()));
        assert!(job.data.transaction_ids.is_empty());
        assert!(network.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn new_transaction_is_persisted_before_submit() {
        let (network, store, worker) = setup();
        let mut job = claim(&store, org1(), "InitLedger", &[]).await;

        let result = worker.process_job(&mut job, "w1").await.unwrap();

        assert!(matches!(result, AttemptResult::Completed(_)));
        let stored = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.data.transaction_ids.len(), 1);
        assert!(stored.data.transaction_state.is_some());
        assert_eq!(network.submissions().await, stored.data.transaction_ids);
    }

    #[tokio::test]
    async fn generic_error_clears_transaction_state() {
        let (network, store, worker) = setup();
        network
            .inject_fault(SubmitFault::Reject(LedgerError::backend("MVCC_READ_CONFLICT")))
            .await;
        let mut job = claim(&store, org1(), "InitLedger", &[]).await;

        let result = worker.process_job(&mut job, "w1").await.unwrap();

        assert!(matches!(result, AttemptResult::Retry { .. }));
        let stored = store.get(job.id).await.unwrap().unwrap();
        assert!(stored.data.transaction_state.is_none());
        assert_eq!(stored.data.transaction_ids.len(), 1);
    }

    #[tokio::test]
    async fn timeout_keeps_transaction_state() {
        let (network, store, worker) = setup();
        network
            .inject_fault(SubmitFault::Reject(LedgerError::timeout("MOCK TIMEOUT", None)))
            .await;
        let mut job = claim(&store, org1(), "InitLedger", &[]).await;

        let result = worker.process_job(&mut job, "w1").await.unwrap();

        assert!(matches!(result, AttemptResult::Retry { .. }));
        assert!(job.data.has_transaction_state());
    }

    #[tokio::test]
    async fn contract_error_is_terminal() {
        let (_network, store, worker) = setup();
        let mut job = claim(&store, org1(), "ReadAsset", &["lote404"]).await;

        let result = worker.process_job(&mut job, "w1").await.unwrap();

        assert_eq!(
            result,
            AttemptResult::Failed(JobOutcome::error("The asset lote404 does not exist"))
        );
    }

    #[tokio::test]
    async fn unreadable_state_is_terminal_and_mints_nothing() {
        let (network, store, worker) = setup();
        let mut job = claim(&store, org1(), "InitLedger", &[]).await;
        job.data.transaction_state = Some(b"garbage".to_vec());

        let result = worker.process_job(&mut job, "w1").await.unwrap();

        assert!(matches!(result, AttemptResult::Failed(_)));
        assert!(job.data.transaction_ids.is_empty());
        assert!(network.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn lost_lease_stops_the_attempt() {
        let (_network, store, worker) = setup();
        let mut job = claim(&store, org1(), "InitLedger", &[]).await;

        let err = worker.process_job(&mut job, "someone-else").await.unwrap_err();

        assert!(matches!(err, SubmitError::Store(JobStoreError::LeaseLost(_))));
    }

    #[tokio::test]
    async fn pool_drains_the_queue_and_shuts_down() {
        let (network, store, worker) = setup();
        for _ in 0..3 {
            store
                .enqueue(SubmitJob::new(
                    SubmitJobData::new(org1(), "InitLedger", vec![]),
                    JobOptions::default(),
                ))
                .await
                .unwrap();
        }

        let worker = SubmitWorker::new(
            store.clone(),
            Arc::clone(&worker.gateways),
            WorkerConfig::default()
                .with_concurrency(2)
                .with_poll_interval(Duration::from_millis(10)),
        );
        let handle = worker.spawn(CancellationToken::new());

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.counts().await.unwrap().completed < 3 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let stats = handle.shutdown().await;
        assert_eq!(stats.jobs_completed, 3);
        assert_eq!(stats.current_running, 0);
        assert_eq!(network.submissions().await.len(), 3);
    }
}
