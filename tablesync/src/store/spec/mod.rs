mod base;
mod memory;
mod postgres;

pub use base::SpecStore;
pub use memory::MemorySpecStore;
pub use postgres::PostgresSpecStore;
