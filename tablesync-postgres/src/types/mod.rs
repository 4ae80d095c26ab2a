mod identifier;

pub use identifier::{DEFAULT_SCHEMA, Identifier, IdentifierError, TableName};
