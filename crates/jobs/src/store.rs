//! Job storage.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::types::{JobId, JobState, SubmitJob};

/// Durable job storage shared by producers, workers and schedulers.
///
/// Every method is atomic with respect to the others.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in the waiting state.
    async fn enqueue(&self, job: SubmitJob) -> Result<JobId, JobStoreError>;

    async fn get(&self, id: JobId) -> Result<Option<SubmitJob>, JobStoreError>;

    /// Commit a whole record on behalf of the worker holding its lease.
    ///
    /// Fails with [`JobStoreError::LeaseLost`] when `lease_owner` no longer
    /// holds the job. Terminal records are subject to retention.
    async fn update(&self, job: &SubmitJob, lease_owner: &str) -> Result<(), JobStoreError>;

    /// Move the oldest waiting job to active under a lease for `owner`.
    async fn claim_next(
        &self,
        owner: &str,
        lease: Duration,
    ) -> Result<Option<SubmitJob>, JobStoreError>;

    async fn extend_lease(&self, id: JobId, owner: &str, lease: Duration)
    -> Result<(), JobStoreError>;

    /// Move delayed jobs whose backoff has elapsed to waiting.
    async fn promote_delayed(&self, now: DateTime<Utc>) -> Result<usize, JobStoreError>;

    /// Requeue active jobs whose lease expired; fail those past the stall
    /// budget.
    async fn requeue_stalled(
        &self,
        now: DateTime<Utc>,
        max_stalled_count: u32,
    ) -> Result<StallReport, JobStoreError>;

    async fn counts(&self) -> Result<JobCounts, JobStoreError>;

    /// Stop accepting and handing out jobs.
    async fn close(&self) -> Result<(), JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {0} is no longer held by this worker")]
    LeaseLost(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job store is closed")]
    Closed,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub active: usize,
    pub completed: usize,
    pub delayed: usize,
    pub failed: usize,
    pub waiting: usize,
}

/// Outcome of a stalled-job sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StallReport {
    pub requeued: usize,
    pub failed: usize,
}

/// How many finished jobs to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_completed: usize,
    pub max_failed: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_completed: 1000,
            max_failed: 1000,
        }
    }
}

impl RetentionPolicy {
    pub fn limit_for(&self, state: JobState) -> Option<usize> {
        match state {
            JobState::Completed => Some(self.max_completed),
            JobState::Failed => Some(self.max_failed),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, SubmitJob>,
    waiting: VecDeque<JobId>,
    closed: bool,
}

impl Inner {
    fn ensure_open(&self) -> Result<(), JobStoreError> {
        if self.closed {
            return Err(JobStoreError::Closed);
        }
        Ok(())
    }

    fn evict_finished(&mut self, state: JobState, limit: usize) {
        let mut finished: Vec<_> = self
            .jobs
            .values()
            .filter(|j| j.state == state)
            .map(|j| (j.finished_at, j.id))
            .collect();

        if finished.len() <= limit {
            return;
        }

        finished.sort();
        let excess = finished.len() - limit;
        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
    }
}

/// In-memory job store for tests and single-process deployments.
#[derive(Debug)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
    retention: RetentionPolicy,
}

impl InMemoryJobStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            retention,
        }
    }

    pub fn arc(retention: RetentionPolicy) -> Arc<Self> {
        Arc::new(Self::new(retention))
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: SubmitJob) -> Result<JobId, JobStoreError> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        if inner.jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        inner.waiting.push_back(id);
        inner.jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, id: JobId) -> Result<Option<SubmitJob>, JobStoreError> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn update(&self, job: &SubmitJob, lease_owner: &str) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .jobs
            .get(&job.id)
            .ok_or(JobStoreError::NotFound(job.id))?;
        if !stored.is_leased_by(lease_owner) {
            return Err(JobStoreError::LeaseLost(job.id));
        }

        // The heartbeat may have pushed the expiry past the caller's copy.
        let mut record = job.clone();
        if record.state == JobState::Active {
            record.lease = stored.lease.clone();
        }
        inner.jobs.insert(job.id, record);
        match job.state {
            JobState::Waiting => inner.waiting.push_back(job.id),
            state => {
                if let Some(limit) = self.retention.limit_for(state) {
                    inner.evict_finished(state, limit);
                }
            }
        }
        Ok(())
    }

    async fn claim_next(
        &self,
        owner: &str,
        lease: Duration,
    ) -> Result<Option<SubmitJob>, JobStoreError> {
        let mut inner = self.inner.write().await;
        inner.ensure_open()?;
        let now = Utc::now();

        while let Some(id) = inner.waiting.pop_front() {
            if let Some(job) = inner.jobs.get_mut(&id) {
                if job.state != JobState::Waiting {
                    continue;
                }
                job.activate(owner, lease, now);
                return Ok(Some(job.clone()));
            }
        }

        Ok(None)
    }

    async fn extend_lease(
        &self,
        id: JobId,
        owner: &str,
        lease: Duration,
    ) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().await;
        let job = inner.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if !job.is_leased_by(owner) {
            return Err(JobStoreError::LeaseLost(id));
        }
        if let Some(current) = job.lease.as_mut() {
            current.expires_at = Utc::now() + super::types::to_chrono(lease);
        }
        Ok(())
    }

    async fn promote_delayed(&self, now: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let mut inner = self.inner.write().await;

        let mut ready: Vec<_> = inner
            .jobs
            .values()
            .filter(|j| j.state == JobState::Delayed && j.delay_until.is_none_or(|at| at <= now))
            .map(|j| (j.delay_until, j.id))
            .collect();
        ready.sort();

        for (_, id) in &ready {
            if let Some(job) = inner.jobs.get_mut(id) {
                job.promote();
            }
            inner.waiting.push_back(*id);
        }

        Ok(ready.len())
    }

    async fn requeue_stalled(
        &self,
        now: DateTime<Utc>,
        max_stalled_count: u32,
    ) -> Result<StallReport, JobStoreError> {
        let mut inner = self.inner.write().await;

        let stalled: Vec<_> = inner
            .jobs
            .values()
            .filter(|j| {
                j.state == JobState::Active && j.lease.as_ref().is_none_or(|l| l.is_expired(now))
            })
            .map(|j| j.id)
            .collect();

        let mut report = StallReport::default();
        for id in stalled {
            let Some(job) = inner.jobs.get_mut(&id) else {
                continue;
            };
            job.stall(max_stalled_count, now);
            if job.state == JobState::Failed {
                report.failed += 1;
            } else {
                report.requeued += 1;
                inner.waiting.push_back(id);
            }
        }

        if report.failed > 0 {
            inner.evict_finished(JobState::Failed, self.retention.max_failed);
        }

        Ok(report)
    }

    async fn counts(&self) -> Result<JobCounts, JobStoreError> {
        let inner = self.inner.read().await;
        let mut counts = JobCounts::default();

        for job in inner.jobs.values() {
            match job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }

        Ok(counts)
    }

    async fn close(&self) -> Result<(), JobStoreError> {
        self.inner.write().await.closed = true;
        Ok(())
    }
}

#[async_trait]
impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    async fn enqueue(&self, job: SubmitJob) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<SubmitJob>, JobStoreError> {
        (**self).get(id).await
    }

    async fn update(&self, job: &SubmitJob, lease_owner: &str) -> Result<(), JobStoreError> {
        (**self).update(job, lease_owner).await
    }

    async fn claim_next(
        &self,
        owner: &str,
        lease: Duration,
    ) -> Result<Option<SubmitJob>, JobStoreError> {
        (**self).claim_next(owner, lease).await
    }

    async fn extend_lease(
        &self,
        id: JobId,
        owner: &str,
        lease: Duration,
    ) -> Result<(), JobStoreError> {
        (**self).extend_lease(id, owner, lease).await
    }

    async fn promote_delayed(&self, now: DateTime<Utc>) -> Result<usize, JobStoreError> {
        (**self).promote_delayed(now).await
    }

    async fn requeue_stalled(
        &self,
        now: DateTime<Utc>,
        max_stalled_count: u32,
    ) -> Result<StallReport, JobStoreError> {
        (**self).requeue_stalled(now, max_stalled_count).await
    }

    async fn counts(&self) -> Result<JobCounts, JobStoreError> {
        (**self).counts().await
    }

    async fn close(&self) -> Result<(), JobStoreError> {
        (**self).close().await
    }
}
