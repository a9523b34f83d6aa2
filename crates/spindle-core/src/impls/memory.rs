//! In-memory job store for tests and local development.
//!
//! One mutex around the whole table makes every call atomic, which is the
//! guarantee a single SQL statement gives. Row locks held by "other
//! transactions" are emulated with `lock_row`: claims skip locked rows
//! instead of waiting, like `FOR UPDATE SKIP LOCKED`.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::{JobId, JobRecord, JobStatus, WorkerId};
use crate::error::StoreError;
use crate::observability::JobCounts;
use crate::ports::{Clock, JobStore, SystemClock};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<JobId, JobRecord>,
    locked: HashSet<JobId>,
    next_id: i64,
}

impl Table {
    /// Oldest claimable row, `(created_at, id)` ascending.
    fn head(&self) -> Option<JobId> {
        self.rows
            .values()
            .filter(|r| r.status.is_claimable() && !self.locked.contains(&r.id))
            .min_by_key(|r| (r.created_at, r.id))
            .map(|r| r.id)
    }
}

pub struct InMemoryJobStore {
    table: Arc<Mutex<Table>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` for `created_at` and `processed_at` stamps.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table {
                next_id: 1,
                ..Table::default()
            })),
            clock,
        }
    }

    /// Hold a row lock as if another transaction had selected the row
    /// `FOR UPDATE`. Released when the guard is dropped.
    pub fn lock_row(&self, job_id: JobId) -> RowLock {
        self.lock().locked.insert(job_id);
        RowLock {
            table: Arc::clone(&self.table),
            job_id,
        }
    }

    /// Insert a row with an explicit status, bypassing the state machine.
    /// Used to seed fixtures such as already-finished jobs.
    pub fn insert_with_status(&self, data: serde_json::Value, status: JobStatus) -> JobId {
        let now = self.clock.now();
        let mut table = self.lock();
        let id = JobId::new(table.next_id);
        table.next_id += 1;
        table.rows.insert(
            id,
            JobRecord {
                id,
                status,
                data,
                worker_id: None,
                created_at: now,
                processed_at: status.is_terminal().then_some(now),
            },
        );
        id
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn claim_next(&self, worker_id: &WorkerId) -> Result<Option<JobRecord>, StoreError> {
        let mut table = self.lock();
        let Some(id) = table.head() else {
            return Ok(None);
        };
        let Some(row) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        row.status = JobStatus::Processing;
        row.worker_id = Some(worker_id.clone());
        Ok(Some(row.clone()))
    }

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::NonTerminalStatus(status));
        }
        let now = self.clock.now();
        let mut table = self.lock();
        let row = table
            .rows
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound(job_id))?;
        if row.status != JobStatus::Processing {
            return Err(StoreError::NotProcessing(job_id));
        }
        row.status = status;
        row.processed_at = Some(now);
        Ok(())
    }

    async fn enqueue(&self, data: serde_json::Value) -> Result<JobId, StoreError> {
        Ok(self.insert_with_status(data, JobStatus::Pending))
    }

    async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.lock().rows.get(&job_id).cloned())
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        let mut counts = JobCounts::default();
        for row in self.lock().rows.values() {
            counts.add(row.status, 1);
        }
        Ok(counts)
    }
}

/// Emulated row lock; see `InMemoryJobStore::lock_row`.
#[must_use = "the row is unlocked as soon as the guard is dropped"]
pub struct RowLock {
    table: Arc<Mutex<Table>>,
    job_id: JobId,
}

impl Drop for RowLock {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.locked.remove(&self.job_id);
    }
}
