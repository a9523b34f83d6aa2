//! Impls - adapters behind the ports.
//!
//! - `PgJobStore`: production store (PostgreSQL, skip-locked claims)
//! - `InMemoryJobStore`: tests and local development
//! - `SimulatedProcessor`: placeholder processing step

pub mod memory;
pub mod postgres;
pub mod simulated;

pub use self::memory::{InMemoryJobStore, RowLock};
pub use self::postgres::{PgJobStore, PgStoreOptions};
pub use self::simulated::SimulatedProcessor;
