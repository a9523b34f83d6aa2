//! Claim engine: reserve exactly one pending job per call.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::domain::{Job, WorkerId};
use crate::error::ClaimError;
use crate::ports::JobStore;

/// Claims jobs for one worker and decodes their payload into `P`.
///
/// Holds no coordination state: exclusivity comes entirely from the
/// store's atomic claim statement.
pub struct ClaimEngine<P> {
    store: Arc<dyn JobStore>,
    worker_id: WorkerId,
    _payload: PhantomData<fn() -> P>,
}

impl<P: DeserializeOwned> ClaimEngine<P> {
    pub fn new(store: Arc<dyn JobStore>, worker_id: WorkerId) -> Self {
        Self {
            store,
            worker_id,
            _payload: PhantomData,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// - `Ok(Some(job))`: the job is now `processing` and owned by this worker
    /// - `Ok(None)`: nothing pending (or everything pending is locked)
    /// - `Err(_)`: the store failed, or the payload did not decode. In the
    ///   decode case the row has already been flipped to `processing`.
    pub async fn claim(&self) -> Result<Option<Job<P>>, ClaimError> {
        let Some(record) = self.store.claim_next(&self.worker_id).await? else {
            return Ok(None);
        };

        record
            .decode()
            .map(Some)
            .map_err(|source| ClaimError::Decode {
                job_id: record.id,
                source,
            })
    }
}
