use thiserror::Error;

use crate::domain::{JobId, JobStatus};

/// Failures reported by a `JobStore` adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to job store: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("query failed in {operation}: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid row in {operation}: {reason}")]
    InvalidRow {
        operation: &'static str,
        reason: String,
    },

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {0} is not in processing state")]
    NotProcessing(JobId),

    #[error("status {0} is not terminal")]
    NonTerminalStatus(JobStatus),
}

/// Failures of a single claim attempt.
///
/// An empty queue is not an error; `ClaimEngine::claim` returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The row was already flipped to `processing` when decoding failed,
    /// so the job stays stranded.
    #[error("failed to decode payload of job {job_id}: {source}")]
    Decode {
        job_id: JobId,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure of the processing step. Only the fact of failure is persisted.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProcessError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
