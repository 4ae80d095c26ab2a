//! Reconciliation planning.
//!
//! [`plan`] turns a validated [`SyncSpec`] into a backend-neutral [`ReconciliationPlan`]
//! describing the three operations of a reconciliation: update matched rows, insert rows
//! missing from the target and delete rows missing from the source. The plan is rendered
//! into SQL by [`statement::PostgresStatementBuilder`].

use std::fmt;

use tablesync_postgres::types::{Identifier, TableName};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::spec::SyncSpec;

pub mod statement;

/// Equality of target and source on every key column, in declared key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPredicate {
    pub keys: Vec<Identifier>,
}

/// `target.column = source.column` for one non-key merge column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub column: Identifier,
}

/// Columns written when inserting source rows missing from the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertMapping {
    pub columns: Vec<Identifier>,
}

/// Target rows whose key tuple has no match in the source are removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCondition {
    pub match_predicate: MatchPredicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Update, insert and delete.
    Full,
    /// Every merge column is a key, nothing can be updated.
    InsertDelete,
    /// No merge columns, only rows missing from the source are removed.
    DeleteOnly,
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanMode::Full => f.write_str("full"),
            PlanMode::InsertDelete => f.write_str("insert_delete"),
            PlanMode::DeleteOnly => f.write_str("delete_only"),
        }
    }
}

/// The reconciliation of one target table with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub target_table: TableName,
    pub source_table: TableName,
    pub match_predicate: MatchPredicate,
    pub update_assignments: Vec<Assignment>,
    /// `None` in delete-only mode.
    pub insert_mapping: Option<InsertMapping>,
    pub delete_condition: DeleteCondition,
}

impl ReconciliationPlan {
    pub fn mode(&self) -> PlanMode {
        match (&self.insert_mapping, self.update_assignments.is_empty()) {
            (None, _) => PlanMode::DeleteOnly,
            (Some(_), true) => PlanMode::InsertDelete,
            (Some(_), false) => PlanMode::Full,
        }
    }

    /// Every column the plan reads from the source and writes to the target.
    pub fn merged_columns(&self) -> &[Identifier] {
        self.insert_mapping
            .as_ref()
            .map(|mapping| mapping.columns.as_slice())
            .unwrap_or_default()
    }
}

/// Builds the reconciliation plan for `spec`.
///
/// Key columns are never updated but are always inserted, whether or not `columns_to_merge`
/// lists them. Fails when source and target are the same table.
pub fn plan(spec: &SyncSpec) -> SyncResult<ReconciliationPlan> {
    if spec.source_table == spec.target_table {
        bail!(
            ErrorKind::SourceIsTarget,
            "Source and target are the same table",
            format!("The table '{}' cannot be reconciled with itself", spec.target_table)
        );
    }

    let match_predicate = MatchPredicate {
        keys: spec.primary_key.clone(),
    };

    let update_assignments = spec
        .columns_to_merge
        .iter()
        .filter(|column| !spec.primary_key.contains(column))
        .map(|column| Assignment {
            column: column.clone(),
        })
        .collect();

    let insert_mapping = (!spec.columns_to_merge.is_empty()).then(|| InsertMapping {
        columns: spec
            .primary_key
            .iter()
            .chain(
                spec.columns_to_merge
                    .iter()
                    .filter(|column| !spec.primary_key.contains(column)),
            )
            .cloned()
            .collect(),
    });

    Ok(ReconciliationPlan {
        target_table: spec.target_table.clone(),
        source_table: spec.source_table.clone(),
        delete_condition: DeleteCondition {
            match_predicate: match_predicate.clone(),
        },
        match_predicate,
        update_assignments,
        insert_mapping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::spec::SpecRow;

    fn spec(primary_key: &str, columns_to_merge: Option<&str>) -> SyncSpec {
        SyncSpec::try_from_row(&SpecRow::new(
            "dbo.orders",
            "stg.orders",
            primary_key,
            columns_to_merge,
        ))
        .unwrap()
    }

    fn names(columns: &[Identifier]) -> Vec<&str> {
        columns.iter().map(Identifier::as_str).collect()
    }

    #[test]
    fn full_plan_updates_non_key_columns_only() {
        let plan = plan(&spec("id", Some("id,name,amount"))).unwrap();

        assert_eq!(plan.mode(), PlanMode::Full);
        assert_eq!(names(&plan.match_predicate.keys), ["id"]);
        let updated: Vec<&str> = plan
            .update_assignments
            .iter()
            .map(|a| a.column.as_str())
            .collect();
        assert_eq!(updated, ["name", "amount"]);
        assert_eq!(names(plan.merged_columns()), ["id", "name", "amount"]);
        assert_eq!(plan.delete_condition.match_predicate, plan.match_predicate);
    }

    #[test]
    fn key_only_merge_columns_skip_updates() {
        let plan = plan(&spec("tenant_id,order_id", Some("order_id,tenant_id"))).unwrap();

        assert_eq!(plan.mode(), PlanMode::InsertDelete);
        assert!(plan.update_assignments.is_empty());
        assert_eq!(names(&plan.match_predicate.keys), ["tenant_id", "order_id"]);
    }

    #[test]
    fn empty_merge_columns_plan_delete_only() {
        let plan = plan(&spec("id", None)).unwrap();

        assert_eq!(plan.mode(), PlanMode::DeleteOnly);
        assert!(plan.insert_mapping.is_none());
        assert!(plan.merged_columns().is_empty());
    }

    #[test]
    fn key_columns_are_inserted_even_when_not_merged() {
        let plan = plan(&spec("id", Some("name"))).unwrap();

        assert_eq!(plan.mode(), PlanMode::Full);
        let updated: Vec<&str> = plan
            .update_assignments
            .iter()
            .map(|a| a.column.as_str())
            .collect();
        assert_eq!(updated, ["name"]);
        assert_eq!(names(plan.merged_columns()), ["id", "name"]);
    }

    #[test]
    fn insert_columns_start_with_keys_in_key_order() {
        let plan = plan(&spec("tenant_id,order_id", Some("total,order_id"))).unwrap();

        assert_eq!(
            names(plan.merged_columns()),
            ["tenant_id", "order_id", "total"]
        );
        assert_eq!(plan.update_assignments.len(), 1);
    }

    #[test]
    fn source_and_target_must_differ() {
        let same = SyncSpec::try_from_row(&SpecRow::new("orders", "public.orders", "id", None))
            .unwrap();

        assert_eq!(plan(&same).unwrap_err().kind(), ErrorKind::SourceIsTarget);
    }
}
