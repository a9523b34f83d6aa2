//! Job lifecycle runner.
//!
//! The poll loop is an explicit state machine:
//!
//! ```text
//! Idle -> Claiming -> Processing -> Finalizing -> Idle
//!             |
//!             +-- no job / claim error: pause, then Idle
//! ```
//!
//! Pauses go through the injected `Clock`, so tests can step the loop on
//! virtual time.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::claim::ClaimEngine;
use super::config::WorkerConfig;
use crate::domain::{Job, JobId, JobStatus};
use crate::ports::{Clock, JobProcessor, JobStore};

/// Where the runner is within one poll cycle.
#[derive(Debug)]
pub enum RunnerState<P> {
    Idle,
    Claiming,
    Processing(Job<P>),
    Finalizing { job_id: JobId, status: JobStatus },
}

/// What a finished poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Nothing to claim; paused for the idle interval.
    Idle,
    /// The claim failed; paused for the error interval.
    ClaimFailed,
    /// The job reached its terminal status.
    Finalized { job_id: JobId, status: JobStatus },
    /// Writing the terminal status failed; the job may stay `processing`.
    FinalizeFailed { job_id: JobId, status: JobStatus },
}

/// Sequential claim-process-finalize loop of one worker process.
///
/// Every method takes `&mut self`: one runner drives one loop. Scale out by
/// running more processes against the same store.
pub struct Runner<P> {
    engine: ClaimEngine<P>,
    store: Arc<dyn JobStore>,
    processor: Arc<dyn JobProcessor<P>>,
    clock: Arc<dyn Clock>,
    idle_interval: Duration,
    error_interval: Duration,
    state: RunnerState<P>,
}

impl<P> Runner<P>
where
    P: DeserializeOwned + Send + Sync,
{
    pub fn new(
        store: Arc<dyn JobStore>,
        processor: Arc<dyn JobProcessor<P>>,
        clock: Arc<dyn Clock>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            engine: ClaimEngine::new(Arc::clone(&store), config.worker_id.clone()),
            store,
            processor,
            clock,
            idle_interval: config.idle_interval,
            error_interval: config.error_interval,
            state: RunnerState::Idle,
        }
    }

    pub fn state(&self) -> &RunnerState<P> {
        &self.state
    }

    /// Perform one transition. Returns the cycle summary when the runner
    /// is back to `Idle`.
    pub async fn step(&mut self) -> Option<Cycle> {
        let state = std::mem::replace(&mut self.state, RunnerState::Idle);

        let (next, cycle) = match state {
            RunnerState::Idle => (RunnerState::Claiming, None),
            RunnerState::Claiming => self.claim().await,
            RunnerState::Processing(job) => (self.process(job).await, None),
            RunnerState::Finalizing { job_id, status } => {
                (RunnerState::Idle, Some(self.finalize(job_id, status).await))
            }
        };

        self.state = next;
        cycle
    }

    /// Run transitions until the current cycle is over.
    pub async fn tick(&mut self) -> Cycle {
        loop {
            if let Some(cycle) = self.step().await {
                return cycle;
            }
        }
    }

    /// Poll forever. Only process termination stops the loop.
    pub async fn run(mut self) {
        info!(worker_id = %self.engine.worker_id(), "worker started");
        loop {
            self.tick().await;
        }
    }

    async fn claim(&self) -> (RunnerState<P>, Option<Cycle>) {
        match self.engine.claim().await {
            Ok(Some(job)) => {
                info!(
                    job_id = %job.id(),
                    worker_id = %self.engine.worker_id(),
                    "claimed job"
                );
                (RunnerState::Processing(job), None)
            }
            Ok(None) => {
                debug!(pause = ?self.idle_interval, "no pending job");
                self.clock.sleep(self.idle_interval).await;
                (RunnerState::Idle, Some(Cycle::Idle))
            }
            Err(err) => {
                warn!(error = %err, pause = ?self.error_interval, "failed to claim job");
                self.clock.sleep(self.error_interval).await;
                (RunnerState::Idle, Some(Cycle::ClaimFailed))
            }
        }
    }

    async fn process(&self, job: Job<P>) -> RunnerState<P> {
        let status = match self.processor.process(&job).await {
            Ok(()) => JobStatus::Completed,
            Err(err) => {
                warn!(job_id = %job.id(), error = %err, "job processing failed");
                JobStatus::Error
            }
        };
        RunnerState::Finalizing {
            job_id: job.id(),
            status,
        }
    }

    async fn finalize(&self, job_id: JobId, status: JobStatus) -> Cycle {
        match self.store.set_status(job_id, status).await {
            Ok(()) => {
                info!(job_id = %job_id, status = %status, "job finalized");
                Cycle::Finalized { job_id, status }
            }
            Err(err) => {
                error!(
                    job_id = %job_id,
                    status = %status,
                    error = %err,
                    "failed to finalize job; it stays in processing"
                );
                Cycle::FinalizeFailed { job_id, status }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FilePayload, JobRecord, WorkerId};
    use crate::error::{ProcessError, StoreError};
    use crate::impls::InMemoryJobStore;
    use crate::observability::JobCounts;
    use crate::ports::ManualClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records every job it sees; fails when `fail` is set.
    struct RecordingProcessor {
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl RecordingProcessor {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl JobProcessor<FilePayload> for RecordingProcessor {
        async fn process(&self, job: &Job<FilePayload>) -> Result<(), ProcessError> {
            self.seen.lock().unwrap().push(job.payload().filename.clone());
            if self.fail {
                Err(ProcessError::new("malformed csv"))
            } else {
                Ok(())
            }
        }
    }

    /// Wraps the in-memory store and injects failures on demand.
    struct FlakyStore {
        inner: InMemoryJobStore,
        fail_claim: AtomicBool,
        fail_finalize: AtomicBool,
    }

    fn injected(operation: &'static str) -> StoreError {
        StoreError::Query {
            operation,
            source: sqlx::Error::PoolTimedOut,
        }
    }

    #[async_trait]
    impl JobStore for FlakyStore {
        async fn claim_next(&self, worker_id: &WorkerId) -> Result<Option<JobRecord>, StoreError> {
            if self.fail_claim.load(Ordering::SeqCst) {
                return Err(injected("claim_next"));
            }
            self.inner.claim_next(worker_id).await
        }

        async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), StoreError> {
            if self.fail_finalize.load(Ordering::SeqCst) {
                return Err(injected("set_status"));
            }
            self.inner.set_status(job_id, status).await
        }

        async fn enqueue(&self, data: serde_json::Value) -> Result<JobId, StoreError> {
            self.inner.enqueue(data).await
        }

        async fn get(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError> {
            self.inner.get(job_id).await
        }

        async fn counts(&self) -> Result<JobCounts, StoreError> {
            self.inner.counts().await
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn config() -> WorkerConfig {
        WorkerConfig::new("postgres://unused")
            .with_worker_id(WorkerId::new("w-1"))
            .with_idle_interval(Duration::from_secs(5))
            .with_error_interval(Duration::from_secs(7))
    }

    fn flaky(clock: &Arc<ManualClock>) -> Arc<FlakyStore> {
        Arc::new(FlakyStore {
            inner: InMemoryJobStore::with_clock(clock.clone()),
            fail_claim: AtomicBool::new(false),
            fail_finalize: AtomicBool::new(false),
        })
    }

    fn file(name: &str) -> serde_json::Value {
        serde_json::json!({ "filename": name })
    }

    #[tokio::test]
    async fn states_follow_idle_claiming_processing_finalizing() {
        let clock = clock();
        let store = Arc::new(InMemoryJobStore::with_clock(clock.clone()));
        let id = store.enqueue(file("a.csv")).await.unwrap();
        let mut runner = Runner::new(store.clone(), RecordingProcessor::new(false), clock, &config());

        assert!(matches!(runner.state(), RunnerState::Idle));
        assert_eq!(runner.step().await, None);
        assert!(matches!(runner.state(), RunnerState::Claiming));
        assert_eq!(runner.step().await, None);
        assert!(matches!(runner.state(), RunnerState::Processing(job) if job.id() == id));
        assert_eq!(runner.step().await, None);
        assert!(matches!(
            runner.state(),
            RunnerState::Finalizing { status: JobStatus::Completed, .. }
        ));
        assert_eq!(
            runner.step().await,
            Some(Cycle::Finalized {
                job_id: id,
                status: JobStatus::Completed
            })
        );
        assert!(matches!(runner.state(), RunnerState::Idle));
    }

    #[tokio::test]
    async fn successful_job_is_completed_without_pause() {
        let clock = clock();
        let store = Arc::new(InMemoryJobStore::with_clock(clock.clone()));
        let id = store.enqueue(file("a.csv")).await.unwrap();
        let processor = RecordingProcessor::new(false);
        let mut runner = Runner::new(store.clone(), processor.clone(), clock.clone(), &config());

        let cycle = runner.tick().await;

        assert_eq!(
            cycle,
            Cycle::Finalized {
                job_id: id,
                status: JobStatus::Completed
            }
        );
        let row = store.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Completed);
        assert!(row.processed_at.is_some());
        assert_eq!(*processor.seen.lock().unwrap(), vec!["a.csv".to_string()]);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn failed_processing_finalizes_error_once() {
        let clock = clock();
        let store = Arc::new(InMemoryJobStore::with_clock(clock.clone()));
        let id = store.enqueue(file("a.csv")).await.unwrap();
        let processor = RecordingProcessor::new(true);
        let mut runner = Runner::new(store.clone(), processor.clone(), clock.clone(), &config());

        assert_eq!(
            runner.tick().await,
            Cycle::Finalized {
                job_id: id,
                status: JobStatus::Error
            }
        );
        let row = store.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Error);
        assert!(row.processed_at.is_some());

        // not retried
        assert_eq!(runner.tick().await, Cycle::Idle);
        assert_eq!(processor.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_queue_pauses_for_idle_interval() {
        let clock = clock();
        let store = Arc::new(InMemoryJobStore::with_clock(clock.clone()));
        let mut runner = Runner::new(store, RecordingProcessor::new(false), clock.clone(), &config());

        assert_eq!(runner.tick().await, Cycle::Idle);
        assert_eq!(runner.tick().await, Cycle::Idle);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(5)]
        );
    }

    #[tokio::test]
    async fn claim_error_pauses_for_error_interval_then_recovers() {
        let clock = clock();
        let store = flaky(&clock);
        let id = store.enqueue(file("a.csv")).await.unwrap();
        store.fail_claim.store(true, Ordering::SeqCst);
        let mut runner = Runner::new(store.clone(), RecordingProcessor::new(false), clock.clone(), &config());

        assert_eq!(runner.tick().await, Cycle::ClaimFailed);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(7)]);
        assert_eq!(
            store.get(id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );

        store.fail_claim.store(false, Ordering::SeqCst);
        assert_eq!(
            runner.tick().await,
            Cycle::Finalized {
                job_id: id,
                status: JobStatus::Completed
            }
        );
    }

    #[tokio::test]
    async fn decode_failure_is_claim_error_and_strands_job() {
        let clock = clock();
        let store = Arc::new(InMemoryJobStore::with_clock(clock.clone()));
        let id = store.enqueue(serde_json::json!({ "file": 12 })).await.unwrap();
        let processor = RecordingProcessor::new(false);
        let mut runner = Runner::new(store.clone(), processor.clone(), clock.clone(), &config());

        assert_eq!(runner.tick().await, Cycle::ClaimFailed);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(7)]);
        assert_eq!(
            store.get(id).await.unwrap().unwrap().status,
            JobStatus::Processing
        );
        assert!(processor.seen.lock().unwrap().is_empty());

        // the stranded row is never claimed again
        assert_eq!(runner.tick().await, Cycle::Idle);
    }

    #[tokio::test]
    async fn finalize_error_leaves_job_processing() {
        let clock = clock();
        let store = flaky(&clock);
        let id = store.enqueue(file("a.csv")).await.unwrap();
        store.fail_finalize.store(true, Ordering::SeqCst);
        let mut runner = Runner::new(store.clone(), RecordingProcessor::new(false), clock.clone(), &config());

        assert_eq!(
            runner.tick().await,
            Cycle::FinalizeFailed {
                job_id: id,
                status: JobStatus::Completed
            }
        );
        let row = store.get(id).await.unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Processing);
        assert!(row.processed_at.is_none());
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn jobs_are_processed_in_creation_order() {
        let clock = clock();
        let store = Arc::new(InMemoryJobStore::with_clock(clock.clone()));
        for name in ["a.csv", "b.csv", "c.csv"] {
            store.enqueue(file(name)).await.unwrap();
            clock.advance(Duration::from_secs(1));
        }
        let processor = RecordingProcessor::new(false);
        let mut runner = Runner::new(store.clone(), processor.clone(), clock.clone(), &config());

        for _ in 0..3 {
            assert!(matches!(runner.tick().await, Cycle::Finalized { .. }));
        }
        assert_eq!(runner.tick().await, Cycle::Idle);
        assert_eq!(*processor.seen.lock().unwrap(), vec!["a.csv", "b.csv", "c.csv"]);
    }
}
