//! Tracing subscriber configuration.
//!
//! Every line starts with a `YYYY-MM-DD HH:MM:SS,mmm` timestamp followed by the
//! level and the message. Log viewers that parse run records rely on this shape,
//! so [`RecordTimer`] must stay the timer of every installed layer.

use std::fmt;
use std::fmt::Write as _;
use std::io;
use std::path::Path;
use std::sync::Once;

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix of the per-run log file name.
const LOG_FILE_PREFIX: &str = "tablesync_log";

const LOG_FILE_SUFFIX: &str = "txt";

/// Timestamp layout at the start of each line, e.g. `2024-03-01 08:15:42,017`.
const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Timestamp layout embedded in the log file name.
const LOG_FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

static INIT_TEST_TRACING: Once = Once::new();

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to create log directory `{directory}`: {source}")]
    LogDirectory {
        directory: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open log file: {0}")]
    LogFile(#[from] InitError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Formats `time` with the run-record timestamp layout.
pub fn format_record_timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    time.format(RECORD_TIMESTAMP_FORMAT).to_string()
}

/// Returns the log file name for a run started at `started_at`.
pub fn log_file_name<Tz>(started_at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!(
        "{LOG_FILE_PREFIX}_{}.{LOG_FILE_SUFFIX}",
        started_at.format(LOG_FILE_TIMESTAMP_FORMAT)
    )
}

/// Timer writing local time in the run-record timestamp layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordTimer;

impl FormatTime for RecordTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        w.write_str(&format_record_timestamp(&Local::now()))
    }
}

/// Keeps the background log file writer alive.
///
/// Buffered lines are flushed when this value is dropped, so it must be held until
/// the process is about to exit.
#[must_use = "dropping the flusher stops writing to the log file"]
pub struct LogFlusher {
    _guard: Option<WorkerGuard>,
}

/// Installs the global subscriber.
///
/// Lines always go to stdout. When `log_directory` is given, they are also written
/// without colors to a new `tablesync_log_<timestamp>.txt` file in that directory.
pub fn init_tracing(log_directory: Option<&Path>) -> Result<LogFlusher, TracingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_timer(RecordTimer)
        .with_target(false);

    let mut guard = None;
    let file_layer = match log_directory {
        Some(directory) => {
            std::fs::create_dir_all(directory).map_err(|source| TracingError::LogDirectory {
                directory: directory.display().to_string(),
                source,
            })?;

            let file_name = log_file_name(&Local::now());
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(file_name)
                .build(directory)?;
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);

            Some(
                tracing_subscriber::fmt::layer()
                    .with_timer(RecordTimer)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test-friendly subscriber once per process.
///
/// Safe to call from every test, later calls are no-ops.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let _ = tracing_subscriber::fmt()
            .with_timer(RecordTimer)
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
