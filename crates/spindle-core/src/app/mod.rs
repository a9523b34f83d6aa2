//! App - the worker's application layer.
//!
//! - **ClaimEngine**: reserves one pending job per call and decodes its payload
//! - **Runner**: the claim, process and finalize loop
//! - **WorkerConfig**: startup configuration of one worker process

pub mod claim;
pub mod config;
pub mod runner;

pub use self::claim::ClaimEngine;
pub use self::config::WorkerConfig;
pub use self::runner::{Cycle, Runner, RunnerState};
