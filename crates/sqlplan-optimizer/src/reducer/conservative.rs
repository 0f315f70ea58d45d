//! Conservative sub-query reducer.
//!
//! Only removes a parent that is a pure projection (a renaming subset of the
//! child's columns, optionally with ORDER BY and LIMIT). The child keeps its
//! own clauses untouched.

use std::collections::HashSet;

use sqlplan_core::error::Result;
use sqlplan_core::expr::SqlExpr;
use sqlplan_core::node::{
    SqlOrderByDescription, SqlPlanNodeRef, SqlSelectColumn, SqlSelectStatementNode,
};

use super::{
    blocks_substitution, carry_group_bys, cte_aliases_collide, min_limit, order_by_lineage,
    CollapseRule, ReducerVisitor,
};
use crate::rules::SqlPlanOptimizer;

#[derive(Debug, Clone, Copy)]
pub struct SqlSubQueryReducer {
    max_reduction_rounds: usize,
}

impl SqlSubQueryReducer {
    pub fn new(max_reduction_rounds: usize) -> Self {
        Self {
            max_reduction_rounds,
        }
    }
}

impl Default for SqlSubQueryReducer {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SqlPlanOptimizer for SqlSubQueryReducer {
    fn name(&self) -> &'static str {
        "sub_query_reducer"
    }

    fn optimize(&self, node: &SqlPlanNodeRef) -> Result<SqlPlanNodeRef> {
        let mut visitor = ReducerVisitor::new(self, self.max_reduction_rounds);
        Ok(visitor.reduce(node))
    }
}

impl CollapseRule for SqlSubQueryReducer {
    fn try_collapse(&self, parent: &SqlSelectStatementNode) -> Option<SqlSelectStatementNode> {
        if !parent.join_descs.is_empty()
            || parent.where_.is_some()
            || !parent.group_bys.is_empty()
            || parent.distinct
        {
            return None;
        }
        let child = parent.from_source.as_select_node()?;
        let source_alias = parent.from_source_alias.as_str();
        if blocks_substitution(parent) || blocks_substitution(child) {
            return None;
        }
        if !order_by_lineage(child).column_alias_references.is_empty() {
            return None;
        }
        if cte_aliases_collide(parent, child) {
            return None;
        }

        // parent alias -> child column it projects
        let mut projected: Vec<(&str, &SqlSelectColumn)> = Vec::new();
        for column in &parent.select_columns {
            let col_ref = column.expr.as_column_reference()?;
            if col_ref.table_alias != source_alias {
                return None;
            }
            projected.push((column.column_alias.as_str(), child.select_column(&col_ref.column_name)?));
        }
        let used: HashSet<&str> = projected
            .iter()
            .map(|(_, c)| c.column_alias.as_str())
            .collect();

        if child.distinct && child.select_columns.iter().any(|c| !used.contains(c.column_alias.as_str())) {
            return None;
        }
        if child.group_bys.iter().any(|g| !used.contains(g.column_alias.as_str())) {
            return None;
        }

        let select_columns: Vec<SqlSelectColumn> = projected
            .iter()
            .map(|(alias, c)| SqlSelectColumn::new(c.expr.clone(), *alias))
            .collect();

        let order_bys = if parent.order_bys.is_empty() {
            child.order_bys.clone()
        } else {
            if !child.order_bys.is_empty() || child.limit.is_some() {
                return None;
            }
            parent
                .order_bys
                .iter()
                .map(|o| {
                    let alias = match &o.expr {
                        SqlExpr::ColumnAliasReference { column_alias } => {
                            parent.select_column(column_alias)?.column_alias.clone()
                        }
                        SqlExpr::ColumnReference { col_ref, .. } if col_ref.table_alias == source_alias => {
                            parent
                                .select_columns
                                .iter()
                                .find(|c| c.expr.as_column_reference() == Some(col_ref))?
                                .column_alias
                                .clone()
                        }
                        _ => return None,
                    };
                    Some(SqlOrderByDescription {
                        expr: SqlExpr::alias_ref(alias),
                        descending: o.descending,
                    })
                })
                .collect::<Option<Vec<_>>>()?
        };

        let mut cte_sources = parent.cte_sources.clone();
        cte_sources.extend(child.cte_sources.iter().cloned());

        Some(
            SqlSelectStatementNode {
                group_bys: carry_group_bys(&child.group_bys, &select_columns),
                select_columns,
                order_bys,
                cte_sources,
                limit: min_limit(parent.limit, child.limit),
                ..child.clone()
            }
            .renewed(),
        )
    }
}
