//! Ports - seams between the claim protocol and the outside world.
//!
//! - `JobStore`: the backing store (PostgreSQL is the source of truth)
//! - `Clock`: current time and the runner's pauses
//! - `JobProcessor`: the business logic run for a claimed job

pub mod clock;
pub mod job_store;
pub mod processor;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::job_store::JobStore;
pub use self::processor::JobProcessor;
