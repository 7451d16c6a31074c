//! Submission job record, options, and state transitions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledgerq_core::{OrgId, TransactionId};

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// delay * 2^(attempts - 1)
    Exponential,
}

impl std::str::FromStr for BackoffType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(BackoffType::Fixed),
            "exponential" => Ok(BackoffType::Exponential),
            other => Err(format!("unknown backoff type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    #[serde(rename = "type")]
    pub kind: BackoffType,
    pub delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            kind: BackoffType::Fixed,
            delay: Duration::from_millis(3000),
        }
    }
}

impl Backoff {
    /// Delay after the given number of finished attempts (1-indexed).
    pub fn delay_for_attempt(&self, attempts_made: u32) -> Duration {
        if attempts_made == 0 {
            return Duration::ZERO;
        }

        match self.kind {
            BackoffType::Fixed => self.delay,
            BackoffType::Exponential => {
                let exp = 2u32.saturating_pow(attempts_made - 1);
                self.delay.saturating_mul(exp)
            }
        }
    }
}

/// Per-job delivery options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub backoff: Backoff,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Backoff::default(),
        }
    }
}

/// Serde helpers for byte fields stored as base64 strings.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// What to submit, and the transaction identities used so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobData {
    pub org_id: OrgId,
    pub transaction_name: String,
    pub transaction_args: Vec<String>,
    /// Every transaction id minted for this job, oldest first.
    #[serde(default)]
    pub transaction_ids: Vec<TransactionId>,
    /// Serialized handle of the transaction to resubmit, if its identity must
    /// be reused.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub transaction_state: Option<Vec<u8>>,
}

impl SubmitJobData {
    pub fn new(org_id: OrgId, transaction_name: impl Into<String>, transaction_args: Vec<String>) -> Self {
        Self {
            org_id,
            transaction_name: transaction_name.into(),
            transaction_args,
            transaction_ids: Vec::new(),
            transaction_state: None,
        }
    }

    /// Record a freshly minted transaction identity.
    pub fn with_transaction(mut self, transaction_id: TransactionId, state: Vec<u8>) -> Self {
        self.transaction_ids.push(transaction_id);
        self.transaction_state = Some(state);
        self
    }

    /// Forget the in-flight handle so the next attempt mints a new id.
    pub fn without_transaction_state(mut self) -> Self {
        self.transaction_state = None;
        self
    }

    pub fn has_transaction_state(&self) -> bool {
        self.transaction_state.as_ref().is_some_and(|s| !s.is_empty())
    }
}

/// Final result of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_error: Option<String>,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub transaction_payload: Option<Vec<u8>>,
}

impl JobOutcome {
    pub fn payload(payload: Vec<u8>) -> Self {
        Self {
            transaction_error: None,
            transaction_payload: Some(payload),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            transaction_error: Some(message.into()),
            transaction_payload: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Result of one processing attempt, as decided by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    /// Submitted; the payload is the transaction result.
    Completed(JobOutcome),
    /// Terminal failure; never retried.
    Failed(JobOutcome),
    /// Retriable failure; retried while attempts remain.
    Retry { error: String },
}

/// Time-bounded ownership of an active job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Record of a processing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Error recorded for a job that kept losing its worker.
pub const STALLED_REASON: &str = "job stalled more than allowable limit";

/// A queued ledger submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJob {
    pub id: JobId,
    pub name: String,
    pub data: SubmitJobData,
    pub opts: JobOptions,
    pub state: JobState,
    pub attempts_made: u32,
    #[serde(default)]
    pub stalled_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<Lease>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<JobAttemptRecord>,
}

impl SubmitJob {
    pub fn new(data: SubmitJobData, opts: JobOptions) -> Self {
        Self {
            id: JobId::new(),
            name: format!("submit {} transaction", data.transaction_name),
            data,
            opts,
            state: JobState::Waiting,
            attempts_made: 0,
            stalled_count: 0,
            outcome: None,
            failed_reason: None,
            lease: None,
            delay_until: None,
            created_at: Utc::now(),
            processed_at: None,
            finished_at: None,
            history: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_leased_by(&self, owner: &str) -> bool {
        self.state == JobState::Active && self.lease.as_ref().is_some_and(|l| l.owner == owner)
    }

    /// Hand the job to a worker.
    pub fn activate(&mut self, owner: impl Into<String>, lease: Duration, now: DateTime<Utc>) {
        self.state = JobState::Active;
        self.lease = Some(Lease {
            owner: owner.into(),
            expires_at: now + to_chrono(lease),
        });
        self.delay_until = None;
        self.processed_at = Some(now);
    }

    /// Delayed → waiting once the backoff elapsed.
    pub fn promote(&mut self) {
        self.state = JobState::Waiting;
        self.delay_until = None;
    }

    /// The worker lost its lease. Requeue, or fail once the stall budget is
    /// spent.
    pub fn stall(&mut self, max_stalled_count: u32, now: DateTime<Utc>) {
        self.stalled_count += 1;
        self.lease = None;
        if self.stalled_count > max_stalled_count {
            self.state = JobState::Failed;
            self.failed_reason = Some(STALLED_REASON.to_string());
            self.finished_at = Some(now);
        } else {
            self.state = JobState::Waiting;
        }
    }

    /// Fold an attempt's result into the record.
    ///
    /// A retriable failure becomes terminal once `opts.attempts` is spent, with
    /// the last error stored as the outcome.
    pub fn apply_attempt(mut self, result: AttemptResult, now: DateTime<Utc>) -> SubmitJob {
        let started_at = self.processed_at.unwrap_or(now);
        self.attempts_made += 1;
        self.lease = None;

        let error = match &result {
            AttemptResult::Completed(_) => None,
            AttemptResult::Failed(outcome) => outcome.transaction_error.clone(),
            AttemptResult::Retry { error } => Some(error.clone()),
        };
        self.history.push(JobAttemptRecord {
            attempt: self.attempts_made,
            started_at,
            finished_at: now,
            success: matches!(result, AttemptResult::Completed(_)),
            error: error.clone(),
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
        });

        match result {
            AttemptResult::Completed(outcome) => {
                self.state = JobState::Completed;
                self.outcome = Some(outcome);
                self.finished_at = Some(now);
            }
            AttemptResult::Failed(outcome) => {
                self.state = JobState::Failed;
                self.failed_reason = Some(error.unwrap_or_else(|| "job failed".to_string()));
                self.outcome = Some(outcome);
                self.finished_at = Some(now);
            }
            AttemptResult::Retry { error } if self.attempts_made >= self.opts.attempts => {
                self.state = JobState::Failed;
                self.failed_reason = Some(error.clone());
                self.outcome = Some(JobOutcome::error(error));
                self.finished_at = Some(now);
            }
            AttemptResult::Retry { error } => {
                self.failed_reason = Some(error);
                let delay = self.opts.backoff.delay_for_attempt(self.attempts_made);
                if delay.is_zero() {
                    self.state = JobState::Waiting;
                    self.delay_until = None;
                } else {
                    self.state = JobState::Delayed;
                    self.delay_until = Some(now + to_chrono(delay));
                }
            }
        }

        self
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn job(attempts: u32, backoff: Backoff) -> SubmitJob {
        SubmitJob::new(
            SubmitJobData::new(OrgId::new("Org1MSP"), "CreateAsset", vec!["lote9".to_string()]),
            JobOptions { attempts, backoff },
        )
    }

    fn no_delay() -> Backoff {
        Backoff {
            kind: BackoffType::Fixed,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn exponential_backoff_doubles() {
        let backoff = Backoff {
            kind: BackoffType::Exponential,
            delay: Duration::from_millis(100),
        };

        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = Backoff::default();

        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(3000));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(3000));
    }

    #[test]
    fn name_includes_transaction_name() {
        assert_eq!(job(1, no_delay()).name, "submit CreateAsset transaction");
    }

    #[test]
    fn transaction_ids_only_grow() {
        let data = SubmitJobData::new(OrgId::new("Org1MSP"), "DeleteAsset", vec![])
            .with_transaction(TransactionId::new("tx1"), b"state1".to_vec())
            .without_transaction_state()
            .with_transaction(TransactionId::new("tx2"), b"state2".to_vec());

        assert_eq!(
            data.transaction_ids,
            vec![TransactionId::new("tx1"), TransactionId::new("tx2")]
        );
        assert_eq!(data.transaction_state.as_deref(), Some(&b"state2"[..]));
    }

    #[test]
    fn retry_is_delayed_by_backoff() {
        let now = Utc::now();
        let mut j = job(3, Backoff::default());
        j.activate("worker-1", Duration::from_secs(30), now);

        let j = j.apply_attempt(AttemptResult::Retry { error: "boom".into() }, now);

        assert_eq!(j.state, JobState::Delayed);
        assert_eq!(j.attempts_made, 1);
        assert_eq!(j.delay_until, Some(now + chrono::Duration::milliseconds(3000)));
        assert!(j.lease.is_none());
        assert!(j.outcome.is_none());
    }

    #[test]
    fn zero_delay_retry_goes_straight_to_waiting() {
        let now = Utc::now();
        let j = job(3, no_delay()).apply_attempt(AttemptResult::Retry { error: "boom".into() }, now);

        assert_eq!(j.state, JobState::Waiting);
        assert!(j.delay_until.is_none());
    }

    #[test]
    fn exhausted_retries_fail_with_last_error() {
        let now = Utc::now();
        let mut j = job(2, no_delay());
        j = j.apply_attempt(AttemptResult::Retry { error: "first".into() }, now);
        j = j.apply_attempt(AttemptResult::Retry { error: "second".into() }, now);

        assert_eq!(j.state, JobState::Failed);
        assert_eq!(j.outcome, Some(JobOutcome::error("second")));
        assert_eq!(j.history.len(), 2);
        assert!(j.history.iter().all(|h| !h.success));
    }

    #[test]
    fn terminal_failure_ignores_remaining_budget() {
        let now = Utc::now();
        let j = job(5, no_delay()).apply_attempt(
            AttemptResult::Failed(JobOutcome::error("The asset lote1 already exists")),
            now,
        );

        assert_eq!(j.state, JobState::Failed);
        assert_eq!(j.attempts_made, 1);
        assert_eq!(j.failed_reason.as_deref(), Some("The asset lote1 already exists"));
    }

    #[test]
    fn completion_stores_payload() {
        let now = Utc::now();
        let j = job(5, no_delay()).apply_attempt(AttemptResult::Completed(JobOutcome::payload(b"ok".to_vec())), now);

        assert_eq!(j.state, JobState::Completed);
        assert!(j.history[0].success);
        assert_eq!(j.finished_at, Some(now));
    }

    #[test]
    fn stalling_past_the_limit_fails() {
        let now = Utc::now();
        let mut j = job(5, no_delay());

        j.activate("w", Duration::from_secs(1), now);
        j.stall(1, now);
        assert_eq!(j.state, JobState::Waiting);

        j.activate("w", Duration::from_secs(1), now);
        j.stall(1, now);
        assert_eq!(j.state, JobState::Failed);
        assert_eq!(j.failed_reason.as_deref(), Some(STALLED_REASON));
    }

    #[test]
    fn transaction_state_is_base64_in_json() {
        let data = SubmitJobData::new(OrgId::new("Org1MSP"), "InitLedger", vec![])
            .with_transaction(TransactionId::new("tx1"), b"hello".to_vec());

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["transactionState"], "aGVsbG8=");
        assert_eq!(json["orgId"], "Org1MSP");

        let back: SubmitJobData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    proptest! {
        #[test]
        fn exponential_backoff_doubles_every_attempt(delay_ms in 1u64..10_000, attempt in 1u32..16) {
            let backoff = Backoff { kind: BackoffType::Exponential, delay: Duration::from_millis(delay_ms) };
            prop_assert_eq!(
                backoff.delay_for_attempt(attempt + 1),
                backoff.delay_for_attempt(attempt) * 2
            );
        }
    }
}
