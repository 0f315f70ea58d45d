//! Sub-query reduction.
//!
//! Both reducers walk the plan bottom-up and, at each select statement,
//! repeatedly try to merge it with a select statement it reads from until no
//! rule applies (or the configured round limit is hit). They differ only in
//! which merges they consider safe, expressed by `CollapseRule`.

use std::collections::{HashMap, HashSet};

use sqlplan_core::expr::{SqlColumnReplacements, SqlColumnReference, SqlExpr, SqlExprLineage};
use sqlplan_core::id::NodeId;
use sqlplan_core::node::{
    SqlCreateTableAsNode, SqlCteNode, SqlJoinDescription, SqlPlanNode, SqlPlanNodeRef,
    SqlSelectColumn, SqlSelectStatementNode, SqlSelectTextNode, SqlTableNode,
};
use sqlplan_core::visitor::SqlPlanNodeVisitor;

mod conservative;
mod rewriting;

pub use conservative::SqlSubQueryReducer;
pub use rewriting::SqlRewritingSubQueryReducer;

/// One merge step at a single statement.
pub(crate) trait CollapseRule {
    /// The merged statement, or `None` if no merge is safe.
    fn try_collapse(&self, node: &SqlSelectStatementNode) -> Option<SqlSelectStatementNode>;
}

/// Bottom-up driver shared by both reducers.
pub(crate) struct ReducerVisitor<'r, R: CollapseRule> {
    rule: &'r R,
    max_rounds: usize,
    reduced: HashMap<NodeId, SqlPlanNodeRef>,
}

impl<'r, R: CollapseRule> ReducerVisitor<'r, R> {
    pub(crate) fn new(rule: &'r R, max_rounds: usize) -> Self {
        Self {
            rule,
            max_rounds,
            reduced: HashMap::new(),
        }
    }

    pub(crate) fn reduce(&mut self, node: &SqlPlanNodeRef) -> SqlPlanNodeRef {
        if let Some(done) = self.reduced.get(&node.id()) {
            return done.clone();
        }
        let rebuilt = match node.as_ref() {
            SqlPlanNode::Table(_) | SqlPlanNode::SelectText(_) => node.clone(),
            _ => node.accept(self),
        };
        self.reduced.insert(node.id(), rebuilt.clone());
        rebuilt
    }

    fn reduce_cte(&mut self, cte: &SqlCteNode) -> SqlCteNode {
        if let Some(SqlPlanNode::Cte(done)) = self.reduced.get(&cte.id).map(|n| n.as_ref()) {
            return done.clone();
        }
        let rebuilt = SqlCteNode::new(self.reduce(&cte.select_statement), cte.cte_alias.clone());
        self.reduced.insert(cte.id, rebuilt.clone().into_node());
        rebuilt
    }
}

impl<R: CollapseRule> SqlPlanNodeVisitor for ReducerVisitor<'_, R> {
    type Output = SqlPlanNodeRef;

    fn visit_table_node(&mut self, node: &SqlTableNode) -> SqlPlanNodeRef {
        node.clone().into_node()
    }

    fn visit_select_text_node(&mut self, node: &SqlSelectTextNode) -> SqlPlanNodeRef {
        node.clone().into_node()
    }

    fn visit_select_statement_node(&mut self, node: &SqlSelectStatementNode) -> SqlPlanNodeRef {
        let mut current = SqlSelectStatementNode {
            id: NodeId::next(),
            from_source: self.reduce(&node.from_source),
            join_descs: node
                .join_descs
                .iter()
                .map(|j| SqlJoinDescription {
                    right_source: self.reduce(&j.right_source),
                    ..j.clone()
                })
                .collect(),
            cte_sources: node.cte_sources.iter().map(|c| self.reduce_cte(c)).collect(),
            ..node.clone()
        };

        for _round in 0..self.max_rounds {
            match self.rule.try_collapse(&current) {
                Some(collapsed) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(round = _round, node = %node.id, "collapsed sub-query");
                    current = collapsed;
                }
                None => break,
            }
        }
        current.into_node()
    }

    fn visit_cte_node(&mut self, node: &SqlCteNode) -> SqlPlanNodeRef {
        self.reduce_cte(node).into_node()
    }

    fn visit_create_table_as_node(&mut self, node: &SqlCreateTableAsNode) -> SqlPlanNodeRef {
        SqlCreateTableAsNode::new(node.sql_table.clone(), self.reduce(&node.parent)).into_node()
    }
}

/// Lineage of every expression in `node` except its ORDER BY.
pub(crate) fn lineage_without_order_by(node: &SqlSelectStatementNode) -> SqlExprLineage {
    SqlExprLineage::combine(
        node.select_columns
            .iter()
            .map(|c| &c.expr)
            .chain(node.join_descs.iter().filter_map(|j| j.on_condition.as_ref()))
            .chain(node.where_.iter())
            .chain(node.group_bys.iter().map(|c| &c.expr))
            .map(SqlExpr::lineage),
    )
}

pub(crate) fn select_lineage(node: &SqlSelectStatementNode) -> SqlExprLineage {
    SqlExprLineage::combine(node.select_columns.iter().map(|c| c.expr.lineage()))
}

pub(crate) fn order_by_lineage(node: &SqlSelectStatementNode) -> SqlExprLineage {
    SqlExprLineage::combine(node.order_bys.iter().map(|o| o.expr.lineage()))
}

/// Opaque inputs or alias references outside ORDER BY make column
/// substitution unsound for this statement.
pub(crate) fn blocks_substitution(node: &SqlSelectStatementNode) -> bool {
    let lineage = lineage_without_order_by(node);
    lineage.has_unknown_used_columns()
        || !lineage.column_alias_references.is_empty()
        || order_by_lineage(node).has_unknown_used_columns()
}

pub(crate) fn is_aggregated(node: &SqlSelectStatementNode) -> bool {
    !node.group_bys.is_empty() || select_lineage(node).contains_aggregate
}

pub(crate) fn min_limit(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// `(source_alias, child column alias)` → child column expression.
pub(crate) fn child_column_replacements(
    source_alias: &str,
    child: &SqlSelectStatementNode,
) -> SqlColumnReplacements {
    let mut replacements = SqlColumnReplacements::new();
    for column in &child.select_columns {
        replacements.insert(
            SqlColumnReference::new(source_alias, &column.column_alias),
            column.expr.clone(),
        );
    }
    replacements
}

/// True if every reference `node` makes to `source_alias` names a column the
/// child exposes.
pub(crate) fn references_resolve(
    node: &SqlSelectStatementNode,
    source_alias: &str,
    replacements: &SqlColumnReplacements,
) -> bool {
    node.all_exprs()
        .into_iter()
        .flat_map(|e| e.lineage().column_references)
        .filter(|col_ref| col_ref.table_alias == source_alias)
        .all(|col_ref| replacements.contains(&col_ref))
}

pub(crate) fn cte_aliases_collide(a: &SqlSelectStatementNode, b: &SqlSelectStatementNode) -> bool {
    let aliases: HashSet<&str> = a.cte_sources.iter().map(|c| c.cte_alias.as_str()).collect();
    b.cte_sources
        .iter()
        .any(|c| aliases.contains(c.cte_alias.as_str()))
}

/// Child GROUP BY entries moved up into a merged statement, renamed to the
/// merged select alias that carries the same expression when there is one.
pub(crate) fn carry_group_bys(
    child_group_bys: &[SqlSelectColumn],
    merged_select: &[SqlSelectColumn],
) -> Vec<SqlSelectColumn> {
    child_group_bys
        .iter()
        .map(|g| {
            let alias = merged_select
                .iter()
                .find(|c| c.expr == g.expr)
                .map_or_else(|| g.column_alias.clone(), |c| c.column_alias.clone());
            SqlSelectColumn::new(g.expr.clone(), alias)
        })
        .collect()
}
