//! Producer-side facade over a [`JobStore`].

use tracing::debug;

use ledgerq_core::OrgId;

use super::store::{JobCounts, JobStore, JobStoreError};
use super::summary::JobSummary;
use super::types::{JobId, JobOptions, SubmitJob, SubmitJobData};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Queue of ledger submissions.
#[derive(Debug, Clone)]
pub struct SubmitQueue<S> {
    store: S,
    options: JobOptions,
}

impl<S: JobStore> SubmitQueue<S> {
    pub fn new(store: S, options: JobOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Queue `transaction_name(asset_id, args...)` for `org_id`.
    pub async fn enqueue_submission(
        &self,
        org_id: OrgId,
        transaction_name: &str,
        asset_id: &str,
        args: Vec<String>,
    ) -> Result<JobId, JobError> {
        let mut transaction_args = Vec::with_capacity(args.len() + 1);
        transaction_args.push(asset_id.to_string());
        transaction_args.extend(args);

        let job = SubmitJob::new(
            SubmitJobData::new(org_id, transaction_name, transaction_args),
            self.options,
        );
        let id = self.store.enqueue(job).await?;
        debug!(job_id = %id, transaction = transaction_name, asset_id, "queued submit job");
        Ok(id)
    }

    pub async fn get_job_summary(&self, job_id: JobId) -> Result<JobSummary, JobError> {
        match self.store.get(job_id).await? {
            Some(job) => Ok(JobSummary::from_job(&job)),
            None => Err(JobError::NotFound(job_id.to_string())),
        }
    }

    /// Like [`get_job_summary`](Self::get_job_summary) for an unparsed id;
    /// malformed ids are simply not found.
    pub async fn get_job_summary_by_str(&self, job_id: &str) -> Result<JobSummary, JobError> {
        match job_id.parse::<JobId>() {
            Ok(id) => self.get_job_summary(id).await,
            Err(_) => Err(JobError::NotFound(job_id.to_string())),
        }
    }

    pub async fn get_job_counts(&self) -> Result<JobCounts, JobError> {
        Ok(self.store.counts().await?)
    }

    pub async fn close(&self) -> Result<(), JobError> {
        Ok(self.store.close().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::InMemoryJobStore;

    fn queue() -> SubmitQueue<Arc<dyn JobStore>> {
        SubmitQueue::new(Arc::new(InMemoryJobStore::default()), JobOptions::default())
    }

    #[tokio::test]
    async fn asset_id_is_the_first_argument() {
        let queue = queue();
        let id = queue
            .enqueue_submission(OrgId::new("Org1MSP"), "TransferAsset", "lote1", vec!["Fazenda B".into()])
            .await
            .unwrap();

        let job = queue.store().get(id).await.unwrap().unwrap();
        assert_eq!(job.name, "submit TransferAsset transaction");
        assert_eq!(job.data.transaction_args, vec!["lote1", "Fazenda B"]);
        assert_eq!(job.opts, JobOptions::default());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let queue = queue();

        assert!(matches!(
            queue.get_job_summary(JobId::new()).await,
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            queue.get_job_summary_by_str("not-a-job").await,
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn new_job_summary_is_empty() {
        let queue = queue();
        let id = queue
            .enqueue_submission(OrgId::new("Org1MSP"), "DeleteAsset", "lote1", vec![])
            .await
            .unwrap();

        let summary = queue.get_job_summary_by_str(&id.to_string()).await.unwrap();
        assert_eq!(summary.job_id, id);
        assert!(summary.transaction_ids.is_empty());
        assert_eq!(queue.get_job_counts().await.unwrap().waiting, 1);
    }
}
