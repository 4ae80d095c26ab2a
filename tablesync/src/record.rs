//! Run records.
//!
//! Every outcome of a run is handed to a [`RunRecordSink`]. The default sink writes one log
//! line per table-pair whose wording downstream log viewers match on.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info};

use crate::execution::{ExecutionOutcome, OutcomeStatus};
use crate::run::RunReport;

/// Timestamp layout of run records, e.g. `2024-03-01 08:15:42.017311`.
const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Receives the outcomes of a run.
pub trait RunRecordSink {
    /// Called once per attempted table-pair, as soon as its outcome is known.
    fn record(&self, outcome: &ExecutionOutcome);

    /// Called once after the last outcome of a run.
    fn finish(&self, _report: &RunReport) {}
}

impl<T> RunRecordSink for Arc<T>
where
    T: RunRecordSink + ?Sized,
{
    fn record(&self, outcome: &ExecutionOutcome) {
        (**self).record(outcome)
    }

    fn finish(&self, report: &RunReport) {
        (**self).finish(report)
    }
}

/// Formats the human readable record of `outcome`.
pub fn record_message(outcome: &ExecutionOutcome) -> String {
    let finished_at = outcome.finished_at().format(RECORD_TIMESTAMP_FORMAT);

    if outcome.is_dry_run() {
        return format!(
            "Dry run of {} into {} at {finished_at}: no records loaded",
            outcome.source_table(),
            outcome.target_table(),
        );
    }

    match outcome.error_detail() {
        None => format!(
            "Successfully loaded {} records from {} into {} at {finished_at}",
            outcome.rows_affected().total(),
            outcome.source_table(),
            outcome.target_table(),
        ),
        Some(detail) => format!(
            "Error merging {} into {} at {finished_at}: {detail}",
            outcome.source_table(),
            outcome.target_table(),
        ),
    }
}

/// Sink emitting one `tracing` event per outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecordSink;

impl RunRecordSink for TracingRecordSink {
    fn record(&self, outcome: &ExecutionOutcome) {
        let message = record_message(outcome);
        let rows = outcome.rows_affected();

        if outcome.is_dry_run() {
            info!(
                source_table = %outcome.source_table(),
                target_table = %outcome.target_table(),
                dry_run = true,
                "{message}"
            );

            return;
        }

        match outcome.status() {
            OutcomeStatus::Succeeded => info!(
                source_table = %outcome.source_table(),
                target_table = %outcome.target_table(),
                rows_inserted = rows.inserted(),
                rows_updated = rows.updated(),
                rows_deleted = rows.deleted(),
                duration_seconds = outcome.duration().as_secs_f64(),
                "{message}"
            ),
            OutcomeStatus::Failed => error!(
                source_table = %outcome.source_table(),
                target_table = %outcome.target_table(),
                duration_seconds = outcome.duration().as_secs_f64(),
                "{message}"
            ),
        }
    }

    fn finish(&self, report: &RunReport) {
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            rows = report.total_rows(),
            canceled = report.canceled,
            duration_seconds = report.duration.as_secs_f64(),
            "sync run finished"
        );
    }
}

/// Sink keeping every outcome in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordSink {
    outcomes: Arc<Mutex<Vec<ExecutionOutcome>>>,
    finished: Arc<Mutex<bool>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcomes(&self) -> Vec<ExecutionOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.outcomes().iter().map(record_message).collect()
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RunRecordSink for MemoryRecordSink {
    fn record(&self, outcome: &ExecutionOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome.clone());
    }

    fn finish(&self, _report: &RunReport) {
        *self.finished.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }
}
