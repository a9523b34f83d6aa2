//! PostgreSQL job store.
//!
//! ## Claim
//!
//! The claim is one `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP
//! LOCKED) RETURNING ...` statement. The sub-select locks the oldest
//! pending row, skipping rows other transactions hold, and the outer update
//! flips it to `processing` in the same statement. Concurrent workers never
//! see the same pending row as claimable, and nobody blocks on a row
//! somebody else is claiming.
//!
//! ## Error mapping
//!
//! | Situation | StoreError |
//! |-----------|------------|
//! | pool cannot be opened or `SELECT 1` fails | `Connect` |
//! | any statement fails | `Query { operation, .. }` |
//! | unknown `status` text, unexpected column type | `InvalidRow` |
//! | finalize hits no `processing` row | `NotProcessing` / `NotFound` |
//!
//! Queries use the runtime-checked `sqlx::query` form so no database is
//! needed at compile time.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::instrument;

use crate::domain::{JobId, JobRecord, JobStatus, WorkerId};
use crate::error::StoreError;
use crate::observability::JobCounts;
use crate::ports::JobStore;

const CLAIM_SQL: &str = r#"
    UPDATE job_queue
    SET status = 'processing', worker_id = $1
    WHERE id = (
        SELECT id
        FROM job_queue
        WHERE status = 'pending'
        ORDER BY created_at ASC, id ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING id, status, data, worker_id, created_at, processed_at
"#;

const FINALIZE_SQL: &str = r#"
    UPDATE job_queue
    SET status = $1, processed_at = now()
    WHERE id = $2 AND status = 'processing'
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO job_queue (status, data)
    VALUES ('pending', $1)
    RETURNING id
"#;

const SELECT_SQL: &str = r#"
    SELECT id, status, data, worker_id, created_at, processed_at
    FROM job_queue
    WHERE id = $1
"#;

const COUNTS_SQL: &str = r#"
    SELECT status, COUNT(*) AS n
    FROM job_queue
    GROUP BY status
"#;

/// Connection settings for `PgJobStore::connect`.
#[derive(Debug, Clone)]
pub struct PgStoreOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PgStoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// `job_queue` backed by a sqlx connection pool.
///
/// `Clone` shares the pool.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool and verify the server answers.
    ///
    /// No retries: callers treat a failure here as fatal.
    #[instrument(skip(url, options), fields(max_connections = options.max_connections), err)]
    pub async fn connect(url: &str, options: &PgStoreOptions) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(url)
            .await
            .map_err(StoreError::Connect)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StoreError::Connect)?;

        Ok(Self { pool })
    }

    /// Apply the embedded migrations (creates `job_queue`).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self), fields(worker_id = %worker_id), err)]
    async fn claim_next(&self, worker_id: &WorkerId) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query(CLAIM_SQL)
            .bind(worker_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("claim_next", e))?;

        row.map(|r| record_from_row("claim_next", &r)).transpose()
    }

    #[instrument(skip(self), fields(job_id = %job_id, status = %status), err)]
    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::NonTerminalStatus(status));
        }

        let result = sqlx::query(FINALIZE_SQL)
            .bind(status.as_str())
            .bind(job_id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| query_error("set_status", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Nothing updated; tell a missing row apart from a finished one.
        match self.get(job_id).await? {
            Some(_) => Err(StoreError::NotProcessing(job_id)),
            None => Err(StoreError::NotFound(job_id)),
        }
    }

    #[instrument(skip(self, data), err)]
    async fn enqueue(&self, data: serde_json::Value) -> Result<JobId, StoreError> {
        let id: i64 = sqlx::query_scalar(INSERT_SQL)
            .bind(data)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_error("enqueue", e))?;

        Ok(JobId::new(id))
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query(SELECT_SQL)
            .bind(job_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error("get", e))?;

        row.map(|r| record_from_row("get", &r)).transpose()
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        let rows = sqlx::query(COUNTS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error("counts", e))?;

        let mut counts = JobCounts::default();
        for row in rows {
            let status = parse_status("counts", &row)?;
            let n: i64 = row.try_get("n").map_err(|e| invalid_row("counts", e))?;
            counts.add(status, u64::try_from(n).unwrap_or_default());
        }
        Ok(counts)
    }
}

fn record_from_row(operation: &'static str, row: &PgRow) -> Result<JobRecord, StoreError> {
    let id: i64 = row.try_get("id").map_err(|e| invalid_row(operation, e))?;
    let data: serde_json::Value = row.try_get("data").map_err(|e| invalid_row(operation, e))?;
    let worker_id: Option<String> = row
        .try_get("worker_id")
        .map_err(|e| invalid_row(operation, e))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| invalid_row(operation, e))?;
    let processed_at: Option<DateTime<Utc>> = row
        .try_get("processed_at")
        .map_err(|e| invalid_row(operation, e))?;

    Ok(JobRecord {
        id: JobId::new(id),
        status: parse_status(operation, row)?,
        data,
        worker_id: worker_id.map(WorkerId::new),
        created_at,
        processed_at,
    })
}

fn parse_status(operation: &'static str, row: &PgRow) -> Result<JobStatus, StoreError> {
    let text: String = row.try_get("status").map_err(|e| invalid_row(operation, e))?;
    text.parse().map_err(|e| StoreError::InvalidRow {
        operation,
        reason: format!("{e}"),
    })
}

fn query_error(operation: &'static str, source: sqlx::Error) -> StoreError {
    StoreError::Query { operation, source }
}

fn invalid_row(operation: &'static str, err: sqlx::Error) -> StoreError {
    StoreError::InvalidRow {
        operation,
        reason: err.to_string(),
    }
}
