//! `ledgerq-jobs`: durable submission queue for ledger transactions.
//!
//! ## Design
//!
//! - One job per requested submission, tagged with the submitting org
//! - Transaction identity is persisted before every submit so retries can
//!   reuse it when the ledger may already have ordered it
//! - Retries follow the ledger error classification; contract errors and
//!   duplicates stop immediately
//! - Workers hold a lease while processing; the scheduler recovers jobs
//!   whose lease lapsed and promotes delayed retries
//!
//! ## Components
//!
//! - `SubmitQueue`: producer-side enqueue, summaries and counts
//! - `JobStore`: persistence (in-memory, or Redis behind the `redis` feature)
//! - `SubmitWorker`: bounded-concurrency consumer pool
//! - `QueueScheduler`: delayed promotion and stalled-job recovery

pub mod queue;
pub mod scheduler;
pub mod store;
pub mod summary;
pub mod types;
pub mod worker;

#[cfg(feature = "redis")]
pub mod redis_store;


pub use queue::{JobError, SubmitQueue};
pub use scheduler::{QueueScheduler, SchedulerConfig, SchedulerHandle, SchedulerTick};
pub use store::{InMemoryJobStore, JobCounts, JobStore, JobStoreError, RetentionPolicy, StallReport};
pub use summary::JobSummary;
pub use types::{
    AttemptResult, Backoff, BackoffType, JobId, JobOptions, JobOutcome, JobState, SubmitJob,
    SubmitJobData,
};
pub use worker::{SubmitError, SubmitWorker, WorkerConfig, WorkerHandle, WorkerStats};

#[cfg(feature = "redis")]
pub use redis_store::RedisJobStore;
