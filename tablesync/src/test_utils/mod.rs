pub mod database;
#[cfg(feature = "failpoints")]
pub mod failpoints;
