//! JobProcessor port - the domain work done for a claimed job.

use async_trait::async_trait;

use crate::domain::Job;
use crate::error::ProcessError;

/// Processing step for jobs carrying payload `P`.
///
/// May take arbitrary wall-clock time; the runner imposes no timeout and
/// has no way to cancel it.
///
/// # Example
/// ```ignore
/// struct Import;
///
/// #[async_trait]
/// impl JobProcessor<FilePayload> for Import {
///     async fn process(&self, job: &Job<FilePayload>) -> Result<(), ProcessError> {
///         load_csv(&job.payload().filename).map_err(|e| ProcessError::with_source("import", e))
///     }
/// }
/// ```
#[async_trait]
pub trait JobProcessor<P>: Send + Sync {
    async fn process(&self, job: &Job<P>) -> Result<(), ProcessError>;
}
