use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tablesync_config::shared::MergeStrategy;
use tablesync_postgres::types::{Identifier, TableName};
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::execution::{RowCounts, TargetBackend};
use crate::plan::ReconciliationPlan;

/// Separates the rendered cells of a key tuple.
const KEY_SEPARATOR: char = '\u{1f}';

/// An in-memory table of JSON cells.
///
/// Keys follow SQL equality: a key tuple containing `null` never matches another tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    columns: Vec<String>,
    primary_key: Option<Vec<String>>,
    rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary_key: None,
            rows: Vec::new(),
        }
    }

    /// Enforces uniqueness and non-null values on `columns` after every apply.
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Appends `rows`, padding short rows with `null`.
    pub fn with_rows(mut self, rows: Vec<Vec<Value>>) -> Self {
        let width = self.columns.len();
        self.rows.extend(rows.into_iter().map(|mut row| {
            row.resize(width, Value::Null);
            row
        }));
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Rows ordered by their rendered cells, for comparisons independent of row order.
    pub fn sorted_rows(&self) -> Vec<Vec<Value>> {
        let mut rows = self.rows.clone();
        rows.sort_by_key(|row| render_cells(row.iter()));
        rows
    }

    fn column_index(&self, table: &TableName, column: &str) -> SyncResult<usize> {
        match self.columns.iter().position(|c| c == column) {
            Some(index) => Ok(index),
            None => bail!(
                ErrorKind::TargetSchemaError,
                "Column does not exist",
                format!("The column '{column}' does not exist in table '{table}'")
            ),
        }
    }

    fn column_indexes(&self, table: &TableName, columns: &[Identifier]) -> SyncResult<Vec<usize>> {
        columns
            .iter()
            .map(|column| self.column_index(table, column.as_str()))
            .collect()
    }

    fn check_primary_key(&self, table: &TableName) -> SyncResult<()> {
        let Some(primary_key) = &self.primary_key else {
            return Ok(());
        };

        let indexes = primary_key
            .iter()
            .map(|column| self.column_index(table, column))
            .collect::<SyncResult<Vec<_>>>()?;

        let mut seen = HashSet::with_capacity(self.rows.len());
        for row in &self.rows {
            let Some(key) = key_of(row, &indexes) else {
                bail!(
                    ErrorKind::ConstraintViolation,
                    "Null value in primary key",
                    format!("A row of '{table}' has a null primary key value")
                );
            };

            if !seen.insert(key) {
                bail!(
                    ErrorKind::ConstraintViolation,
                    "Duplicate primary key",
                    format!("Table '{table}' would contain the same primary key twice")
                );
            }
        }

        Ok(())
    }
}

/// [`TargetBackend`] over in-memory tables.
///
/// The plan is applied to a copy of the target table, which replaces the original only when
/// every step succeeded. A dropped `apply` future leaves the tables untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: Arc<Mutex<HashMap<TableName, MemoryTable>>>,
    merge_strategy: MergeStrategy,
    apply_delay: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports counts the way the given strategy does on Postgres.
    pub fn with_merge_strategy(mut self, merge_strategy: MergeStrategy) -> Self {
        self.merge_strategy = merge_strategy;
        self
    }

    /// Waits `delay` at the start of every apply, before any table is read.
    pub fn with_apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = Some(delay);
        self
    }

    pub async fn create_table(&self, name: &str, table: MemoryTable) -> SyncResult<()> {
        let name = TableName::parse(name)?;
        self.tables.lock().await.insert(name, table);

        Ok(())
    }

    pub async fn drop_table(&self, name: &str) -> SyncResult<Option<MemoryTable>> {
        let name = TableName::parse(name)?;

        Ok(self.tables.lock().await.remove(&name))
    }

    pub async fn table(&self, name: &str) -> SyncResult<Option<MemoryTable>> {
        let name = TableName::parse(name)?;

        Ok(self.tables.lock().await.get(&name).cloned())
    }
}

impl TargetBackend for MemoryBackend {
    async fn apply(&self, plan: &ReconciliationPlan) -> SyncResult<RowCounts> {
        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
        }

        let mut tables = self.tables.lock().await;
        let target = lookup_table(&tables, &plan.target_table)?;
        let source = lookup_table(&tables, &plan.source_table)?;

        let (reconciled, counts) = reconcile(plan, source, target)?;
        tables.insert(plan.target_table.clone(), reconciled);

        match self.merge_strategy {
            MergeStrategy::Statements => Ok(counts),
            MergeStrategy::Native => Ok(RowCounts::total_only(counts.total())),
        }
    }
}

fn lookup_table<'a>(
    tables: &'a HashMap<TableName, MemoryTable>,
    name: &TableName,
) -> SyncResult<&'a MemoryTable> {
    match tables.get(name) {
        Some(table) => Ok(table),
        None => bail!(
            ErrorKind::TargetTableMissing,
            "Table does not exist",
            format!("The table '{name}' does not exist")
        ),
    }
}

/// Runs update, insert then delete against a copy of `target`.
fn reconcile(
    plan: &ReconciliationPlan,
    source: &MemoryTable,
    target: &MemoryTable,
) -> SyncResult<(MemoryTable, RowCounts)> {
    let keys = &plan.match_predicate.keys;
    let target_keys = target.column_indexes(&plan.target_table, keys)?;
    let source_keys = source.column_indexes(&plan.source_table, keys)?;

    let merged = plan.merged_columns();
    let insert_columns: Vec<(usize, usize)> = target
        .column_indexes(&plan.target_table, merged)?
        .into_iter()
        .zip(source.column_indexes(&plan.source_table, merged)?)
        .collect();

    let updated_columns: Vec<Identifier> = plan
        .update_assignments
        .iter()
        .map(|assignment| assignment.column.clone())
        .collect();
    let update_columns: Vec<(usize, usize)> = target
        .column_indexes(&plan.target_table, &updated_columns)?
        .into_iter()
        .zip(source.column_indexes(&plan.source_table, &updated_columns)?)
        .collect();

    let mut source_index: HashMap<String, usize> = HashMap::with_capacity(source.rows.len());
    for (position, row) in source.rows.iter().enumerate() {
        if let Some(key) = key_of(row, &source_keys) {
            source_index.entry(key).or_insert(position);
        }
    }

    let mut rows = target.rows.clone();

    let mut updated = 0;
    for row in rows.iter_mut() {
        let Some(source_row) = key_of(row, &target_keys)
            .and_then(|key| source_index.get(&key))
            .map(|position| &source.rows[*position])
        else {
            continue;
        };

        let changed = update_columns
            .iter()
            .any(|(target_column, source_column)| row[*target_column] != source_row[*source_column]);
        if changed {
            for (target_column, source_column) in &update_columns {
                row[*target_column] = source_row[*source_column].clone();
            }
            updated += 1;
        }
    }

    let mut inserted = 0;
    if plan.insert_mapping.is_some() {
        let existing: HashSet<String> = rows
            .iter()
            .filter_map(|row| key_of(row, &target_keys))
            .collect();

        for source_row in &source.rows {
            let matched = key_of(source_row, &source_keys).is_some_and(|key| existing.contains(&key));
            if matched {
                continue;
            }

            let mut row = vec![Value::Null; target.columns.len()];
            for (target_column, source_column) in &insert_columns {
                row[*target_column] = source_row[*source_column].clone();
            }
            rows.push(row);
            inserted += 1;
        }
    }

    let before_delete = rows.len();
    rows.retain(|row| key_of(row, &target_keys).is_some_and(|key| source_index.contains_key(&key)));
    let deleted = before_delete - rows.len();

    let reconciled = MemoryTable {
        columns: target.columns.clone(),
        primary_key: target.primary_key.clone(),
        rows,
    };
    reconciled.check_primary_key(&plan.target_table)?;

    Ok((
        reconciled,
        RowCounts::per_kind(inserted, updated, deleted as u64),
    ))
}

/// Renders the key tuple of `row`, or `None` when any key cell is null.
fn key_of(row: &[Value], indexes: &[usize]) -> Option<String> {
    if indexes.iter().any(|index| row[*index].is_null()) {
        return None;
    }

    Some(render_cells(indexes.iter().map(|index| &row[*index])))
}

fn render_cells<'a>(cells: impl Iterator<Item = &'a Value>) -> String {
    let mut rendered = String::new();
    for cell in cells {
        rendered.push_str(&cell.to_string());
        rendered.push(KEY_SEPARATOR);
    }
    rendered
}
