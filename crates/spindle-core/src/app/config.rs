use std::time::Duration;

use crate::domain::WorkerId;
use crate::impls::PgStoreOptions;

/// Configuration of one worker process.
///
/// Supplied once at startup; nothing here changes while the loop runs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Value stamped into `worker_id` on claim.
    pub worker_id: WorkerId,
    /// Pause after a claim that found no pending job.
    pub idle_interval: Duration,
    /// Pause after a claim that failed.
    pub error_interval: Duration,
    /// How long the placeholder processing step takes.
    pub process_duration: Duration,
    /// Upper bound of the connection pool.
    pub max_connections: u32,
}

impl WorkerConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_PROCESS_DURATION: Duration = Duration::from_secs(2);

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            worker_id: WorkerId::generate(),
            idle_interval: Self::DEFAULT_INTERVAL,
            error_interval: Self::DEFAULT_INTERVAL,
            process_duration: Self::DEFAULT_PROCESS_DURATION,
            max_connections: 5,
        }
    }

    pub fn with_worker_id(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = worker_id;
        self
    }

    /// Use the same pause for the idle and the error case.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self.error_interval = interval;
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn with_error_interval(mut self, interval: Duration) -> Self {
        self.error_interval = interval;
        self
    }

    pub fn with_process_duration(mut self, duration: Duration) -> Self {
        self.process_duration = duration;
        self
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn store_options(&self) -> PgStoreOptions {
        PgStoreOptions {
            max_connections: self.max_connections,
            ..PgStoreOptions::default()
        }
    }
}
