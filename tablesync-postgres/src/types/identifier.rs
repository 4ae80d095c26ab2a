use std::fmt;
use std::str::FromStr;

use pg_escape::quote_identifier;
use thiserror::Error;

/// Schema used when a table name is given without one.
pub const DEFAULT_SCHEMA: &str = "public";

/// Postgres truncates identifiers longer than `NAMEDATALEN - 1` bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Errors raised when text fails the identifier allow-list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier `{identifier}` contains disallowed character {character:?}")]
    InvalidCharacter { identifier: String, character: char },

    #[error("identifier `{0}` is longer than 63 bytes")]
    TooLong(String),

    #[error("table name `{0}` has more than two parts, expected `schema.table` or `table`")]
    TooManyParts(String),
}

/// A single validated SQL identifier such as a column, schema or table name.
///
/// Only ASCII alphanumerics and `_` are accepted, so an [`Identifier`] can never carry
/// quotes, whitespace, comment markers or statement separators into generated SQL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Result<Identifier, IdentifierError> {
        let value = value.into();

        if value.is_empty() {
            return Err(IdentifierError::Empty);
        }

        if let Some(character) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(IdentifierError::InvalidCharacter {
                identifier: value,
                character,
            });
        }

        if value.len() > MAX_IDENTIFIER_LEN {
            return Err(IdentifierError::TooLong(value));
        }

        Ok(Identifier(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier quoted for Postgres when quoting is required.
    ///
    /// Mixed-case names come back double-quoted, so they are matched case-sensitively.
    pub fn as_quoted_identifier(&self) -> String {
        quote_identifier(&self.0).into_owned()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::new(s)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A fully qualified Postgres table name consisting of a schema and table name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableName {
    pub schema: Identifier,
    pub name: Identifier,
}

impl TableName {
    pub fn new(schema: Identifier, name: Identifier) -> TableName {
        Self { schema, name }
    }

    /// Parses `schema.table`, or `table` in the [`DEFAULT_SCHEMA`].
    pub fn parse(value: &str) -> Result<TableName, IdentifierError> {
        let mut parts = value.split('.');

        let first = parts.next().unwrap_or_default();
        let second = parts.next();
        if parts.next().is_some() {
            return Err(IdentifierError::TooManyParts(value.to_string()));
        }

        match second {
            Some(name) => Ok(TableName::new(Identifier::new(first)?, Identifier::new(name)?)),
            None => Ok(TableName::new(
                Identifier::new(DEFAULT_SCHEMA)?,
                Identifier::new(first)?,
            )),
        }
    }

    /// Returns the table name as a quoted Postgres identifier, e.g. `public."Users"`.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = self.schema.as_quoted_identifier();
        let quoted_name = self.name.as_quoted_identifier();

        format!("{quoted_schema}.{quoted_name}")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl FromStr for TableName {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableName::parse(s)
    }
}
