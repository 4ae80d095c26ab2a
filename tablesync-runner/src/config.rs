use std::path::Path;

use tablesync_config::shared::RunnerConfig;
use tablesync_config::{load_config, load_config_from};

use crate::error::{RunnerError, RunnerResult};

/// Loads and validates the runner configuration.
///
/// Reads `./configuration` unless `directory` is given. `max_parallel_tables` overrides the
/// configured value before validation.
pub fn load_runner_config(
    directory: Option<&Path>,
    max_parallel_tables: Option<u16>,
) -> RunnerResult<RunnerConfig> {
    let mut config = match directory {
        Some(directory) => load_config_from::<RunnerConfig>(directory),
        None => load_config::<RunnerConfig>(),
    }
    .map_err(RunnerError::config)?;

    if let Some(max_parallel_tables) = max_parallel_tables {
        config.sync.max_parallel_tables = max_parallel_tables;
    }

    config.validate().map_err(RunnerError::config)?;

    Ok(config)
}
