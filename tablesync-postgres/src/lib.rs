//! Postgres building blocks for tablesync: validated identifiers and pool connection.

pub mod sqlx;
pub mod types;
