//! Placeholder processing step for file jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::domain::{FilePayload, Job};
use crate::error::ProcessError;
use crate::ports::{Clock, JobProcessor};

/// Pretends to import the uploaded file: logs it and waits `duration`.
/// Always succeeds.
pub struct SimulatedProcessor {
    clock: Arc<dyn Clock>,
    duration: Duration,
}

impl SimulatedProcessor {
    pub fn new(clock: Arc<dyn Clock>, duration: Duration) -> Self {
        Self { clock, duration }
    }
}

#[async_trait]
impl JobProcessor<FilePayload> for SimulatedProcessor {
    async fn process(&self, job: &Job<FilePayload>) -> Result<(), ProcessError> {
        info!(job_id = %job.id(), filename = %job.payload().filename, "processing job");
        self.clock.sleep(self.duration).await;
        Ok(())
    }
}
