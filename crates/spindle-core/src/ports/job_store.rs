//! JobStore port - the only component touching persistence.
//!
//! Every method is one self-contained, auto-committed statement. No
//! transaction or row lock outlives a call, which is why a crash between
//! `claim_next` and `set_status` strands the job in `processing`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{JobId, JobRecord, JobStatus, WorkerId};
use crate::error::StoreError;
use crate::observability::JobCounts;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically move the oldest unlocked `pending` job to `processing`,
    /// stamp `worker_id` and return the updated row.
    ///
    /// `Ok(None)` when no pending row is available, including when every
    /// pending row is locked by another claimant.
    async fn claim_next(&self, worker_id: &WorkerId) -> Result<Option<JobRecord>, StoreError>;

    /// Finalize a claimed job: set a terminal `status` and stamp
    /// `processed_at`.
    ///
    /// Fails with `NonTerminalStatus` for `pending`/`processing` and with
    /// `NotProcessing` when the row is not currently `processing`, so a
    /// terminal status is never overwritten.
    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError>;

    /// Insert a new `pending` job.
    async fn enqueue(&self, data: serde_json::Value) -> Result<JobId, StoreError>;

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError>;

    async fn counts(&self) -> Result<JobCounts, StoreError>;
}

#[async_trait]
impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    async fn claim_next(&self, worker_id: &WorkerId) -> Result<Option<JobRecord>, StoreError> {
        (**self).claim_next(worker_id).await
    }

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError> {
        (**self).set_status(job_id, status).await
    }

    async fn enqueue(&self, data: serde_json::Value) -> Result<JobId, StoreError> {
        (**self).enqueue(data).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError> {
        (**self).get(job_id).await
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        (**self).counts().await
    }
}
