//! `tablesync` binary.
//!
//! Loads the runner configuration, reconciles every configured table-pair once and exits.
//! The exit code is non-zero only when the run could not start or the spec set could not be
//! loaded. Failed table-pairs are reported through the run records.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tablesync_telemetry::tracing::init_tracing;
use tracing::{error, info};

use crate::config::load_runner_config;
use crate::core::start_sync_with_config;
use crate::error::{RunnerError, RunnerResult};

mod config;
mod core;
mod error;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding `base.yaml` and the environment overlays.
    #[arg(long)]
    configuration_dir: Option<PathBuf>,

    /// Render and log the statements of every table-pair without executing them.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Overrides `sync.max_parallel_tables`.
    #[arg(long)]
    max_parallel_tables: Option<u16>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(category = err.category(), error = %err, "tablesync failed");
            eprint!("{}", err.render_report());

            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> RunnerResult<()> {
    let config = load_runner_config(
        args.configuration_dir.as_deref(),
        args.max_parallel_tables,
    )?;

    // Kept alive until the end of `run` so buffered log lines are flushed on exit.
    let _log_flusher =
        init_tracing(config.log.directory.as_deref().map(Path::new)).map_err(RunnerError::config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let report = runtime.block_on(start_sync_with_config(config, args.dry_run))?;

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        canceled = report.canceled,
        "tablesync finished"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_default_to_a_live_run() {
        let args = Args::try_parse_from(["tablesync"]).unwrap();

        assert!(!args.dry_run);
        assert!(args.configuration_dir.is_none());
        assert!(args.max_parallel_tables.is_none());
    }

    #[test]
    fn args_accept_overrides() {
        let args = Args::try_parse_from([
            "tablesync",
            "--configuration-dir",
            "/etc/tablesync",
            "--dry-run",
            "--max-parallel-tables",
            "4",
        ])
        .unwrap();

        assert!(args.dry_run);
        assert_eq!(
            args.configuration_dir.as_deref(),
            Some(Path::new("/etc/tablesync"))
        );
        assert_eq!(args.max_parallel_tables, Some(4));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("configuration");
        let err = load_runner_config(Some(&dir), Some(0)).unwrap_err();

        assert!(matches!(err, RunnerError::Config(_, _)));
    }
}
