//! Client-facing view of a job.

use serde::{Deserialize, Serialize};

use ledgerq_core::TransactionId;

use super::types::{JobId, SubmitJob};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub transaction_ids: Vec<TransactionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_payload: Option<String>,
}

impl JobSummary {
    /// Error and payload are only reported once the job has an outcome; the
    /// payload is then always present, empty when the transaction returned
    /// nothing.
    pub fn from_job(job: &SubmitJob) -> Self {
        let (transaction_error, transaction_payload) = match &job.outcome {
            Some(outcome) => (
                outcome.transaction_error.clone(),
                Some(
                    outcome
                        .transaction_payload
                        .as_deref()
                        .map(|p| String::from_utf8_lossy(p).into_owned())
                        .unwrap_or_default(),
                ),
            ),
            None => (None, None),
        };

        Self {
            job_id: job.id,
            transaction_ids: job.data.transaction_ids.clone(),
            transaction_error,
            transaction_payload,
        }
    }
}
