//! Configuration types shared by the engine and the runner binary.

mod base;
mod connection;
mod log;
mod runner;
mod sync;

pub use base::ValidationError;
pub use connection::{
    IntoConnectOptions, PgConnectionConfig, PgConnectionOptions, TABLESYNC_TARGET_OPTIONS,
    TlsConfig,
};
pub use log::LogConfig;
pub use runner::RunnerConfig;
pub use sync::{MergeStrategy, SpecStoreConfig, SyncConfig};
