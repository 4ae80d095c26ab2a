//! Logging setup for tablesync processes.

pub mod tracing;
