//! Queue scheduler: delayed-job promotion and stalled-job recovery.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Times a job may lose its worker before it is failed.
    pub max_stalled_count: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_stalled_count: 1,
        }
    }
}

/// What one scheduler pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerTick {
    pub promoted: usize,
    pub requeued: usize,
    pub failed: usize,
}

pub struct QueueScheduler<S> {
    store: S,
    config: SchedulerConfig,
}

impl<S: JobStore + 'static> QueueScheduler<S> {
    pub fn new(store: S, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    /// One pass over delayed and active jobs.
    pub async fn run_once(&self) -> Result<SchedulerTick, JobStoreError> {
        let now = Utc::now();
        let promoted = self.store.promote_delayed(now).await?;
        let stalled = self
            .store
            .requeue_stalled(now, self.config.max_stalled_count)
            .await?;

        if stalled.requeued > 0 || stalled.failed > 0 {
            warn!(
                requeued = stalled.requeued,
                failed = stalled.failed,
                "recovered stalled jobs"
            );
        }
        if promoted > 0 {
            debug!(promoted, "promoted delayed jobs");
        }

        Ok(SchedulerTick {
            promoted,
            requeued: stalled.requeued,
            failed: stalled.failed,
        })
    }

    pub fn spawn(self, shutdown: CancellationToken) -> SchedulerHandle {
        let token = shutdown.clone();
        let join = tokio::spawn(async move {
            info!(interval_ms = self.config.interval.as_millis() as u64, "queue scheduler started");
            let mut ticker = tokio::time::interval(self.config.interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "queue scheduler pass failed");
                        }
                    }
                }
            }
            info!("queue scheduler stopped");
        });

        SchedulerHandle { shutdown, join }
    }
}

#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.join.await {
            error!(error = %e, "queue scheduler task failed");
        }
    }
}
