//! Job rows and claim snapshots.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::ids::{JobId, WorkerId};
use super::payload;
use super::status::JobStatus;

/// A `job_queue` row as the store returns it, payload still encoded.
///
/// Stores hand these out; the store itself stays the only source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub data: serde_json::Value,
    pub worker_id: Option<WorkerId>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Decode the payload into a claim snapshot.
    pub fn decode<P: DeserializeOwned>(&self) -> Result<Job<P>, serde_json::Error> {
        Ok(Job {
            id: self.id,
            status: self.status,
            payload: payload::decode(&self.data)?,
            worker_id: self.worker_id.clone(),
            created_at: self.created_at,
        })
    }
}

/// Read-only snapshot of a job taken at claim time.
///
/// Dropping it has no effect on the store; finalizing goes through
/// `JobStore::set_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct Job<P> {
    id: JobId,
    status: JobStatus,
    payload: P,
    worker_id: Option<WorkerId>,
    created_at: DateTime<Utc>,
}

impl<P> Job<P> {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn worker_id(&self) -> Option<&WorkerId> {
        self.worker_id.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
