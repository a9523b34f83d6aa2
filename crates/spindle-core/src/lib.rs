//! spindle-core
//!
//! Building blocks for a worker that claims jobs from a shared PostgreSQL
//! table with `FOR UPDATE SKIP LOCKED`, processes them one at a time and
//! records the terminal status.
//!
//! # Modules
//! - **domain**: job model (ids, status state machine, snapshot, payload codec)
//! - **ports**: seams to the outside world (`JobStore`, `Clock`, `JobProcessor`)
//! - **impls**: adapters (`PgJobStore`, `InMemoryJobStore`, `SimulatedProcessor`)
//! - **app**: claim engine, lifecycle runner and worker configuration
//! - **error**: error types shared by the layers above
//! - **observability**: status counts and tracing setup

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{ClaimEngine, Cycle, Runner, RunnerState, WorkerConfig};
pub use domain::{FilePayload, Job, JobId, JobRecord, JobStatus, WorkerId};
pub use error::{ClaimError, ProcessError, StoreError};
pub use impls::{InMemoryJobStore, PgJobStore, SimulatedProcessor};
pub use ports::{Clock, JobProcessor, JobStore, ManualClock, SystemClock};
