mod base;
mod driver;
mod memory;
mod postgres;

pub use base::{RowCounts, TargetBackend};
pub use driver::{ExecutionDriver, ExecutionOutcome, OutcomeStatus};
pub use memory::{MemoryBackend, MemoryTable};
pub use postgres::PostgresBackend;
