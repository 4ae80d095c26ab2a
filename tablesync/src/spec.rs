use std::collections::HashSet;

use tablesync_postgres::types::{Identifier, TableName};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};

/// Separator of the column lists stored in the configuration table.
const LIST_SEPARATOR: char = ',';

/// A configuration row as it is stored, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct SpecRow {
    pub target_table: Option<String>,
    pub source_table: Option<String>,
    pub primary_key: Option<String>,
    pub columns_to_merge: Option<String>,
}

impl SpecRow {
    /// Builds a row from plain strings, `columns_to_merge` may be absent.
    pub fn new(
        target_table: impl Into<String>,
        source_table: impl Into<String>,
        primary_key: impl Into<String>,
        columns_to_merge: Option<&str>,
    ) -> SpecRow {
        SpecRow {
            target_table: Some(target_table.into()),
            source_table: Some(source_table.into()),
            primary_key: Some(primary_key.into()),
            columns_to_merge: columns_to_merge.map(str::to_string),
        }
    }
}

/// Instructions for reconciling one target table with its staging source.
///
/// All names are validated identifiers. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSpec {
    pub target_table: TableName,
    pub source_table: TableName,
    /// Key columns in declared order, never empty.
    pub primary_key: Vec<Identifier>,
    /// Columns copied from source to target. Empty means delete-only.
    pub columns_to_merge: Vec<Identifier>,
}

impl SyncSpec {
    pub fn try_from_row(row: &SpecRow) -> SyncResult<SyncSpec> {
        let target_table = parse_table(row.target_table.as_deref(), "target_table")?;
        let source_table = parse_table(row.source_table.as_deref(), "source_table")?;

        let primary_key = parse_column_list(row.primary_key.as_deref(), "primary_key")?;
        if primary_key.is_empty() {
            bail!(
                ErrorKind::MalformedSpec,
                "Sync spec has no primary key",
                format!("The spec for target table '{target_table}' has an empty primary_key")
            );
        }

        let columns_to_merge =
            parse_column_list(row.columns_to_merge.as_deref(), "columns_to_merge")?;

        Ok(SyncSpec {
            target_table,
            source_table,
            primary_key,
            columns_to_merge,
        })
    }

    /// Returns `true` when the spec only removes rows missing from the source.
    pub fn is_delete_only(&self) -> bool {
        self.columns_to_merge.is_empty()
    }
}

/// Parses and validates every row, rejecting specs that share a target table.
///
/// The first malformed row fails the whole set.
pub fn parse_spec_rows(rows: &[SpecRow]) -> SyncResult<Vec<SyncSpec>> {
    let mut specs = Vec::with_capacity(rows.len());
    let mut targets = HashSet::with_capacity(rows.len());

    for row in rows {
        let spec = SyncSpec::try_from_row(row)?;

        if !targets.insert(spec.target_table.clone()) {
            bail!(
                ErrorKind::DuplicateTargetTable,
                "Target table configured more than once",
                format!(
                    "The target table '{}' appears in more than one sync spec",
                    spec.target_table
                )
            );
        }

        specs.push(spec);
    }

    Ok(specs)
}

fn parse_table(value: Option<&str>, field: &str) -> SyncResult<TableName> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        bail!(
            ErrorKind::MalformedSpec,
            "Sync spec is missing a table name",
            format!("The field '{field}' is empty")
        );
    }

    Ok(TableName::parse(value)?)
}

fn parse_column_list(value: Option<&str>, field: &str) -> SyncResult<Vec<Identifier>> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Ok(Vec::new());
    }

    let mut columns: Vec<Identifier> = Vec::new();
    for entry in value.split(LIST_SEPARATOR).map(str::trim) {
        if entry.is_empty() {
            bail!(
                ErrorKind::MalformedSpec,
                "Sync spec column list has an empty entry",
                format!("The field '{field}' contains an empty entry: '{value}'")
            );
        }

        let column = Identifier::new(entry)?;
        if columns.contains(&column) {
            bail!(
                ErrorKind::MalformedSpec,
                "Sync spec column list has a duplicate entry",
                format!("The field '{field}' lists column '{column}' more than once")
            );
        }

        columns.push(column);
    }

    Ok(columns)
}
