//! Rendering of reconciliation plans into Postgres SQL.
//!
//! Table and column names come from validated identifiers and are quoted with
//! `pg_escape`, so no configuration text reaches SQL unchecked. The target is always
//! aliased `target` and the source `source`.

use std::fmt;

use tablesync_config::shared::MergeStrategy;
use tablesync_postgres::types::Identifier;

use crate::plan::{MatchPredicate, ReconciliationPlan};

const TARGET_ALIAS: &str = "target";
const SOURCE_ALIAS: &str = "source";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Update,
    Insert,
    Delete,
    /// Single statement performing every operation of the plan.
    Merge,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Update => f.write_str("update"),
            StatementKind::Insert => f.write_str("insert"),
            StatementKind::Delete => f.write_str("delete"),
            StatementKind::Merge => f.write_str("merge"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStatement {
    pub kind: StatementKind,
    pub sql: String,
}

/// Renders plans for a Postgres target.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresStatementBuilder {
    strategy: MergeStrategy,
}

impl PostgresStatementBuilder {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Returns the statements to run, in order, inside one transaction.
    ///
    /// With [`MergeStrategy::Statements`] this is update, insert then delete, with the update
    /// left out when nothing can change and the insert left out in delete-only mode.
    pub fn render(&self, plan: &ReconciliationPlan) -> Vec<RenderedStatement> {
        match self.strategy {
            MergeStrategy::Statements => [
                render_update(plan),
                render_insert(plan),
                Some(render_delete(plan)),
            ]
            .into_iter()
            .flatten()
            .collect(),
            MergeStrategy::Native => vec![render_merge(plan)],
        }
    }
}

fn render_update(plan: &ReconciliationPlan) -> Option<RenderedStatement> {
    if plan.update_assignments.is_empty() {
        return None;
    }

    let columns: Vec<&Identifier> = plan.update_assignments.iter().map(|a| &a.column).collect();

    let sql = format!(
        "update {target} as {TARGET_ALIAS} set {assignments} from {source} as {SOURCE_ALIAS} \
         where {predicate} and ({changed})",
        target = plan.target_table.as_quoted_identifier(),
        source = plan.source_table.as_quoted_identifier(),
        assignments = set_list(&columns),
        predicate = match_condition(&plan.match_predicate),
        changed = changed_condition(&columns),
    );

    Some(RenderedStatement {
        kind: StatementKind::Update,
        sql,
    })
}

fn render_insert(plan: &ReconciliationPlan) -> Option<RenderedStatement> {
    let mapping = plan.insert_mapping.as_ref()?;

    let sql = format!(
        "insert into {target} ({columns}) select {values} from {source} as {SOURCE_ALIAS} \
         where not exists (select 1 from {target} as {TARGET_ALIAS} where {predicate})",
        target = plan.target_table.as_quoted_identifier(),
        source = plan.source_table.as_quoted_identifier(),
        columns = column_list(&mapping.columns),
        values = qualified_column_list(SOURCE_ALIAS, &mapping.columns),
        predicate = match_condition(&plan.match_predicate),
    );

    Some(RenderedStatement {
        kind: StatementKind::Insert,
        sql,
    })
}

fn render_delete(plan: &ReconciliationPlan) -> RenderedStatement {
    let sql = format!(
        "delete from {target} as {TARGET_ALIAS} \
         where not exists (select 1 from {source} as {SOURCE_ALIAS} where {predicate})",
        target = plan.target_table.as_quoted_identifier(),
        source = plan.source_table.as_quoted_identifier(),
        predicate = match_condition(&plan.delete_condition.match_predicate),
    );

    RenderedStatement {
        kind: StatementKind::Delete,
        sql,
    }
}

/// Renders `merge ... when not matched by source`, available from Postgres 17.
fn render_merge(plan: &ReconciliationPlan) -> RenderedStatement {
    let mut sql = format!(
        "merge into {target} as {TARGET_ALIAS} using {source} as {SOURCE_ALIAS} on {predicate}",
        target = plan.target_table.as_quoted_identifier(),
        source = plan.source_table.as_quoted_identifier(),
        predicate = match_condition(&plan.match_predicate),
    );

    if !plan.update_assignments.is_empty() {
        let columns: Vec<&Identifier> =
            plan.update_assignments.iter().map(|a| &a.column).collect();
        sql.push_str(&format!(
            " when matched and ({}) then update set {}",
            changed_condition(&columns),
            set_list(&columns)
        ));
    }

    if let Some(mapping) = &plan.insert_mapping {
        sql.push_str(&format!(
            " when not matched by target then insert ({}) values ({})",
            column_list(&mapping.columns),
            qualified_column_list(SOURCE_ALIAS, &mapping.columns)
        ));
    }

    sql.push_str(" when not matched by source then delete");

    RenderedStatement {
        kind: StatementKind::Merge,
        sql,
    }
}

fn match_condition(predicate: &MatchPredicate) -> String {
    predicate
        .keys
        .iter()
        .map(|key| {
            let key = key.as_quoted_identifier();
            format!("{TARGET_ALIAS}.{key} = {SOURCE_ALIAS}.{key}")
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

fn changed_condition(columns: &[&Identifier]) -> String {
    columns
        .iter()
        .map(|column| {
            let column = column.as_quoted_identifier();
            format!("{TARGET_ALIAS}.{column} is distinct from {SOURCE_ALIAS}.{column}")
        })
        .collect::<Vec<_>>()
        .join(" or ")
}

fn set_list(columns: &[&Identifier]) -> String {
    columns
        .iter()
        .map(|column| {
            let column = column.as_quoted_identifier();
            format!("{column} = {SOURCE_ALIAS}.{column}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_list(columns: &[Identifier]) -> String {
    columns
        .iter()
        .map(Identifier::as_quoted_identifier)
        .collect::<Vec<_>>()
        .join(", ")
}

fn qualified_column_list(alias: &str, columns: &[Identifier]) -> String {
    columns
        .iter()
        .map(|column| format!("{alias}.{}", column.as_quoted_identifier()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::plan::plan;
    use crate::spec::{SpecRow, SyncSpec};

    fn plan_for(primary_key: &str, columns_to_merge: Option<&str>) -> ReconciliationPlan {
        let spec = SyncSpec::try_from_row(&SpecRow::new(
            "dbo.orders",
            "stg.orders",
            primary_key,
            columns_to_merge,
        ))
        .unwrap();

        plan(&spec).unwrap()
    }

    #[test]
    fn statements_render_update_insert_delete_in_order() {
        let statements = PostgresStatementBuilder::default()
            .render(&plan_for("id", Some("id,customer,amount")));

        let kinds: Vec<_> = statements.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            [StatementKind::Update, StatementKind::Insert, StatementKind::Delete]
        );

        assert_eq!(
            statements[0].sql,
            "update dbo.orders as target set customer = source.customer, amount = source.amount \
             from stg.orders as source where target.id = source.id and \
             (target.customer is distinct from source.customer or target.amount is distinct from source.amount)"
        );
        assert_eq!(
            statements[1].sql,
            "insert into dbo.orders (id, customer, amount) select source.id, source.customer, source.amount \
             from stg.orders as source where not exists \
             (select 1 from dbo.orders as target where target.id = source.id)"
        );
        assert_eq!(
            statements[2].sql,
            "delete from dbo.orders as target where not exists \
             (select 1 from stg.orders as source where target.id = source.id)"
        );
    }

    #[test]
    fn composite_keys_join_with_and() {
        let statements = PostgresStatementBuilder::default()
            .render(&plan_for("tenant_id,order_id", Some("tenant_id,order_id")));

        assert_eq!(statements.len(), 2);
        assert!(
            statements[1]
                .sql
                .ends_with("where target.tenant_id = source.tenant_id and target.order_id = source.order_id)")
        );
    }

    #[test]
    fn delete_only_renders_single_delete() {
        let statements = PostgresStatementBuilder::default().render(&plan_for("id", None));

        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].kind, StatementKind::Delete);
    }

    #[test]
    fn mixed_case_columns_are_quoted() {
        let statements =
            PostgresStatementBuilder::default().render(&plan_for("OrderId", Some("OrderId,Total")));

        assert!(statements[0].sql.contains("\"Total\" = source.\"Total\""));
        assert!(statements[0].sql.contains("target.\"OrderId\" = source.\"OrderId\""));
    }

    #[test]
    fn native_strategy_renders_one_merge() {
        let statements = PostgresStatementBuilder::new(MergeStrategy::Native)
            .render(&plan_for("id", Some("id,customer")));

        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].kind, StatementKind::Merge);
        assert_eq!(
            statements[0].sql,
            "merge into dbo.orders as target using stg.orders as source on target.id = source.id \
             when matched and (target.customer is distinct from source.customer) then update set customer = source.customer \
             when not matched by target then insert (id, customer) values (source.id, source.customer) \
             when not matched by source then delete"
        );
    }

    #[test]
    fn native_delete_only_merge_has_single_clause() {
        let statements =
            PostgresStatementBuilder::new(MergeStrategy::Native).render(&plan_for("id", None));

        assert!(statements[0].sql.ends_with("on target.id = source.id when not matched by source then delete"));
    }
}
