use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// At least one table-pair must be allowed to run.
    #[error("`max_parallel_tables` cannot be zero")]
    MaxParallelTablesZero,
    /// A zero timeout would cancel every statement immediately.
    #[error("`statement_timeout_ms` cannot be zero, omit it to use the server default")]
    StatementTimeoutZero,
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// The configuration table name is empty.
    #[error("`specs.table` cannot be empty")]
    EmptySpecTable,
}
