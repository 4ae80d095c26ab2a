use serde::Deserialize;

/// Logging output settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Directory for the per-run log file. Logs only go to stdout when unset.
    #[serde(default)]
    pub directory: Option<String>,
}
