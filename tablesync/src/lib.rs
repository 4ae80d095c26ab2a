//! Table reconciliation engine.
//!
//! A run loads [`spec::SyncSpec`]s from a [`store::spec::SpecStore`], turns each one into a
//! [`plan::ReconciliationPlan`] and applies it to a [`execution::TargetBackend`] inside a
//! single transaction per table-pair. Every attempted pair yields an
//! [`execution::ExecutionOutcome`] which is handed to a [`record::RunRecordSink`].

pub mod concurrency;
pub mod error;
pub mod execution;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod plan;
pub mod record;
pub mod run;
pub mod spec;
pub mod store;
#[cfg(feature = "test-utils")]
pub mod test_utils;
