//! Domain model (ids, status, job rows, payloads).

pub mod ids;
pub mod job;
pub mod payload;
pub mod status;

pub use ids::{JobId, WorkerId};
pub use job::{Job, JobRecord};
pub use payload::FilePayload;
pub use status::{JobStatus, UnknownStatus};
